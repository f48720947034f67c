use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use serde::Deserialize;
use tracing::warn;

use crate::site::SiteConnection;

pub const DEFAULT_CREDENTIALS_PATH: &str = "./credentials.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(rename = "USERNAME", default)]
    pub username: String,
    #[serde(rename = "PASSWORD", default)]
    pub password: String,
    #[serde(rename = "SITEURL", default)]
    pub site_url: String,
}

impl Credentials {
    pub fn has_login(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Replace the stored login with the given values where present.
    pub fn with_overrides(mut self, username: Option<String>, password: Option<String>) -> Self {
        if let Some(username) = username {
            self.username = username;
        }
        if let Some(password) = password {
            self.password = password;
        }
        self
    }

    /// Parse `SITEURL` into a connection. `None` when the field is empty.
    pub fn site(&self) -> Result<Option<SiteConnection>> {
        let raw = self.site_url.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let url = Url::parse(raw).with_context(|| format!("invalid SITEURL: {raw}"))?;
        let https = match url.scheme() {
            "https" => true,
            "http" => false,
            other => bail!("unsupported SITEURL scheme `{other}`: {raw}"),
        };
        let hostname = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("SITEURL has no host: {raw}"))?;
        let hostname = match url.port() {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.to_string(),
        };
        let path = url.path();
        let path = match path.rsplit_once('/') {
            Some((dir, script)) if script.ends_with(".php") => dir,
            _ => path,
        };
        Ok(Some(SiteConnection::new(hostname, path, https)))
    }
}

/// Read credentials from a JSON file. A missing file yields empty credentials.
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    if !path.exists() {
        warn!("File '{}' is not found.", path.display());
        return Ok(Credentials::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: Credentials = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed)
}
