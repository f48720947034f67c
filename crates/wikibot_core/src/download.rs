use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::bot::WikiBot;
use crate::client::{AllPagesQuery, WikiReadApi, category_title};
use crate::namespaces::NS_MAIN;
use crate::wikitext::{count_message, decode_page_text, is_redirect};

pub const PAGE_EXTENSION: &str = "wiki";

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub save_path: PathBuf,
    pub category: Option<String>,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub limit: Option<usize>,
    pub include_redirects: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub listed: usize,
    pub downloaded: usize,
    pub skipped_redirects: usize,
    pub skipped_category: usize,
    pub escaped: Vec<String>,
    pub errors: Vec<String>,
    pub files: Vec<PathBuf>,
}

pub fn download_pages<A: WikiReadApi>(
    bot: &mut WikiBot<A>,
    options: &DownloadOptions,
) -> Result<DownloadReport> {
    info!("Downloading pages...");
    let namespaces = bot.namespaces()?.clone();
    let namespace_index = match options.namespace.as_deref() {
        Some(name) => match namespaces.index_of(name) {
            Some(index) => index,
            None => bail!("unknown namespace `{name}` on {}", bot.hostname()),
        },
        None => NS_MAIN,
    };
    let wanted_category = options.category.as_deref().map(category_title);
    let site_root = options.save_path.join(bot.hostname());

    let titles = bot.api_mut().all_pages(&AllPagesQuery {
        namespace: namespace_index,
        prefix: options.prefix.clone(),
        limit: options.limit,
    })?;

    let mut report = DownloadReport {
        listed: titles.len(),
        ..DownloadReport::default()
    };

    for title in &titles {
        let bytes = match bot.api_mut().page_text(title) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!("Skipping '{title}': {error:#}");
                report.errors.push(format!("{title}: {error:#}"));
                continue;
            }
        };
        let decoded = decode_page_text(&bytes);

        if !options.include_redirects && is_redirect(&decoded.text) {
            debug!("Skipping redirect '{title}'");
            report.skipped_redirects += 1;
            continue;
        }

        if let Some(wanted) = &wanted_category {
            let categories = match bot.api_mut().page_categories(title) {
                Ok(categories) => categories,
                Err(error) => {
                    warn!("Skipping '{title}': {error:#}");
                    report.errors.push(format!("{title}: {error:#}"));
                    continue;
                }
            };
            if !categories.iter().any(|category| category == wanted) {
                report.skipped_category += 1;
                continue;
            }
        }

        let (namespace, name) = namespaces.split_title(title);
        let file_path = mirror_path(&site_root, namespace, name);
        if decoded.escaped {
            warn!("Text for '{name}' contains non-utf-8 characters.");
            report.escaped.push(title.clone());
        }
        write_page(&file_path, &decoded.text)?;
        report.files.push(file_path);
        report.downloaded += 1;
    }

    info!("{}", count_message(report.downloaded, "downloaded"));
    Ok(report)
}

/// `<site_root>/<namespace>/<name>.wiki`, where `site_root` is `<save_path>/<hostname>`.
pub fn mirror_path(site_root: &Path, namespace: &str, name: &str) -> PathBuf {
    site_root
        .join(namespace)
        .join(format!("{name}.{PAGE_EXTENSION}"))
}

fn write_page(path: &Path, text: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}
