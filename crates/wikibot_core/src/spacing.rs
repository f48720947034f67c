use std::borrow::Cow;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::bot::WikiBot;
use crate::client::WikiWriteApi;
use crate::wikitext::{decode_page_text, is_redirect};

pub const EDIT_SUMMARY: &str = "Fixed spacings (automated edit)";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(=+)\s*(.+?)\s*(=+)$").expect("section header pattern compiles")
});
static LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\*+|#+)\s*(.*)").expect("list item pattern compiles"));
static DEFINITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^;\s*(.*)").expect("definition term pattern compiles"));

#[derive(Debug, Clone, Default)]
pub struct SpacingReport {
    pub fixed: Vec<String>,
    pub unchanged: Vec<String>,
    pub errors: Vec<String>,
}

/// Normalize one line. Section headers win over list items, list items over
/// definition terms; anything else is returned untouched.
pub fn fix_line(line: &str) -> Cow<'_, str> {
    if let Some(captures) = SECTION_RE.captures(line) {
        return Cow::Owned(format!("{} {} {}", &captures[1], &captures[2], &captures[3]));
    }
    if let Some(captures) = LIST_RE.captures(line) {
        return Cow::Owned(format!("{} {}", &captures[1], &captures[2]));
    }
    if let Some(captures) = DEFINITION_RE.captures(line) {
        return Cow::Owned(format!("; {}", &captures[1]));
    }
    Cow::Borrowed(line)
}

pub fn fix_spacings_text(text: &str) -> String {
    text.split('\n')
        .map(fix_line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn fix_spacings<A: WikiWriteApi>(
    bot: &mut WikiBot<A>,
    titles: &[String],
) -> Result<SpacingReport> {
    let mut report = SpacingReport::default();

    for title in titles {
        let bytes = match bot.api_mut().page_text(title) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!("Skipping '{title}': {error:#}");
                report.errors.push(format!("{title}: {error:#}"));
                continue;
            }
        };
        let decoded = decode_page_text(&bytes);
        if decoded.escaped {
            warn!("Skipping '{title}': text contains non-utf-8 characters.");
            report
                .errors
                .push(format!("{title}: text contains non-utf-8 characters"));
            continue;
        }

        if is_redirect(&decoded.text) {
            debug!("'{title}' is a redirect, leaving it untouched");
            report.unchanged.push(title.clone());
            continue;
        }

        let fixed = fix_spacings_text(&decoded.text);
        if fixed == decoded.text {
            debug!("'{title}' already has normalized spacing");
            report.unchanged.push(title.clone());
            continue;
        }

        match bot.api_mut().edit_page(title, &fixed, EDIT_SUMMARY) {
            Ok(()) => {
                info!("Fixed spacings on '{title}'.");
                report.fixed.push(title.clone());
            }
            Err(error) => {
                warn!("Failed to edit '{title}': {error:#}");
                report.errors.push(format!("{title}: {error:#}"));
            }
        }
    }

    Ok(report)
}
