use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::bot::WikiBot;
use crate::client::WikiWriteApi;
use crate::wikitext::{count_message, decode_page_text};

#[derive(Debug, Clone, Default)]
pub struct MoveReport {
    pub members: usize,
    pub moved: Vec<String>,
    /// Members whose category comes from a transcluded template.
    pub unchanged: Vec<String>,
    pub errors: Vec<String>,
}

impl MoveReport {
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }
}

pub fn edit_summary(new_category: &str) -> String {
    format!("Moved to category '{new_category}' (automated edit)")
}

/// Rewrite the literal category link. `[[Category:Old]]` wins over
/// `[[Category:Old|`; returns `None` when neither form is present.
pub fn rewrite_category_tag(text: &str, old_category: &str, new_category: &str) -> Option<String> {
    let exact = format!("[[Category:{old_category}]]");
    if text.contains(&exact) {
        return Some(text.replace(&exact, &format!("[[Category:{new_category}]]")));
    }
    let sort_key = format!("[[Category:{old_category}|");
    if text.contains(&sort_key) {
        return Some(text.replace(&sort_key, &format!("[[Category:{new_category}|")));
    }
    None
}

/// Move every member of `old_category` into `new_category`, pausing `delay`
/// between commits.
pub fn move_category_pages<A: WikiWriteApi>(
    bot: &mut WikiBot<A>,
    old_category: &str,
    new_category: &str,
    delay: Duration,
) -> Result<MoveReport> {
    info!("Moving pages from category '{old_category}' to '{new_category}'...");
    let members = bot.api_mut().category_members(old_category)?;
    let summary = edit_summary(new_category);
    let mut report = MoveReport {
        members: members.len(),
        ..MoveReport::default()
    };
    let mut committed_before = false;

    for title in members {
        let bytes = match bot.api_mut().page_text(&title) {
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

        let Some(new_text) = rewrite_category_tag(&decoded.text, old_category, new_category)
        else {
            debug!("'{title}' has no literal category link, leaving it untouched");
            report.unchanged.push(title);
            continue;
        };

        if committed_before && !delay.is_zero() {
            sleep(delay);
        }
        committed_before = true;
        match bot.api_mut().edit_page(&title, &new_text, &summary) {
            Ok(()) => {
                debug!("Moved '{title}'");
                report.moved.push(title);
            }
            Err(error) => {
                warn!("Failed to edit '{title}': {error:#}");
                report.errors.push(format!("{title}: {error:#}"));
            }
        }
    }

    info!(
        "{}",
        count_message(
            report.moved_count(),
            &format!("moved to category '{new_category}'")
        )
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::bot::testing::{MockApi, bot};

    #[test]
    fn rewrites_exact_tag() {
        let text = "Body\n[[Category:Old]]\n[[Category:Other]]";
        assert_eq!(
            rewrite_category_tag(text, "Old", "New").as_deref(),
            Some("Body\n[[Category:New]]\n[[Category:Other]]")
        );
    }

    #[test]
    fn rewrites_sort_key_tag_preserving_suffix() {
        assert_eq!(
            rewrite_category_tag("[[Category:Old|Sortkey]]", "Old", "New").as_deref(),
            Some("[[Category:New|Sortkey]]")
        );
    }

    #[test]
    fn exact_tag_takes_precedence_over_sort_key_tag() {
        assert_eq!(
            rewrite_category_tag("[[Category:Old]] [[Category:Old|k]]", "Old", "New").as_deref(),
            Some("[[Category:New]] [[Category:Old|k]]")
        );
    }

    #[test]
    fn transcluded_category_is_not_rewritten() {
        assert_eq!(rewrite_category_tag("{{OldBox}}", "Old", "New"), None);
        assert_eq!(rewrite_category_tag("[[Category:Older]]", "Old", "New"), None);
    }

    #[test]
    fn moves_members_and_counts_commits() {
        let api = MockApi::default()
            .with_page(0, "Alpha", "a\n[[Category:Old]]")
            .with_page(0, "Beta", "b\n[[Category:Old|Beta, The]]")
            .with_page(0, "Gamma", "{{OldBox}}")
            .with_categories("Alpha", &["Category:Old"])
            .with_categories("Beta", &["Category:Old"])
            .with_categories("Gamma", &["Category:Old"]);
        let mut bot = bot(api);

        let report = move_category_pages(&mut bot, "Old", "New", Duration::ZERO).expect("move");
        assert_eq!(report.members, 3);
        assert_eq!(report.moved_count(), 2);
        assert_eq!(report.unchanged, vec!["Gamma".to_string()]);

        let edits = &bot.api().edits;
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].title, "Alpha");
        assert_eq!(edits[0].content, "a\n[[Category:New]]");
        assert_eq!(edits[0].summary, "Moved to category 'New' (automated edit)");
        assert_eq!(edits[1].content, "b\n[[Category:New|Beta, The]]");
    }

    #[test]
    fn failed_edits_are_not_counted() {
        let mut api = MockApi::default()
            .with_page(0, "Alpha", "[[Category:Old]]")
            .with_page(0, "Beta", "[[Category:Old]]")
            .with_categories("Alpha", &["Category:Old"])
            .with_categories("Beta", &["Category:Old"]);
        api.failing_edits.push("Beta".to_string());
        let mut bot = bot(api);

        let report = move_category_pages(&mut bot, "Old", "New", Duration::ZERO).expect("move");
        assert_eq!(report.moved, vec!["Alpha".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("read-only"));
    }

    #[test]
    fn non_utf8_pages_are_skipped() {
        let mut api = MockApi::default()
            .with_page(0, "Legacy", "")
            .with_categories("Legacy", &["Category:Old"]);
        api.texts
            .insert("Legacy".to_string(), b"\xff[[Category:Old]]".to_vec());
        let mut bot = bot(api);

        let report = move_category_pages(&mut bot, "Old", "New", Duration::ZERO).expect("move");
        assert_eq!(report.moved_count(), 0);
        assert!(bot.api().edits.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn pauses_between_consecutive_commits() {
        let api = MockApi::default()
            .with_page(0, "Alpha", "[[Category:Old]]")
            .with_page(0, "Beta", "[[Category:Old]]")
            .with_categories("Alpha", &["Category:Old"])
            .with_categories("Beta", &["Category:Old"]);
        let mut bot = bot(api);
        let delay = Duration::from_millis(50);

        let started = Instant::now();
        let report = move_category_pages(&mut bot, "Old", "New", delay).expect("move");
        assert_eq!(report.moved_count(), 2);
        assert!(started.elapsed() >= delay);
    }

    #[test]
    fn single_commit_does_not_pause() {
        let api = MockApi::default()
            .with_page(0, "Alpha", "[[Category:Old]]")
            .with_page(0, "Gamma", "{{OldBox}}")
            .with_categories("Alpha", &["Category:Old"])
            .with_categories("Gamma", &["Category:Old"]);
        let mut bot = bot(api);
        let delay = Duration::from_secs(5);

        let started = Instant::now();
        let report = move_category_pages(&mut bot, "Old", "New", delay).expect("move");
        assert_eq!(report.moved_count(), 1);
        assert!(started.elapsed() < delay);
    }
}
