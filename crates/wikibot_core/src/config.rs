use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_USER_AGENT: &str = "wikibot/0.1";
pub const DEFAULT_CONFIG_PATH: &str = ".wikibot/config.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct BotConfig {
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ClientSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub rate_limit_read_ms: Option<u64>,
    pub rate_limit_write_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub max_write_retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

/// HTTP behaviour of the MediaWiki client after env and file overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: 30_000,
            rate_limit_read_ms: 300,
            rate_limit_write_ms: 1_000,
            max_retries: 2,
            max_write_retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl BotConfig {
    /// Resolve client settings: env > config > default.
    pub fn client_settings(&self) -> ClientSettings {
        let defaults = ClientSettings::default();
        let client = &self.client;
        ClientSettings {
            user_agent: env_string("WIKIBOT_USER_AGENT")
                .or_else(|| client.user_agent.clone())
                .unwrap_or(defaults.user_agent),
            timeout_ms: env_parsed("WIKIBOT_HTTP_TIMEOUT_MS")
                .or(client.timeout_ms)
                .unwrap_or(defaults.timeout_ms),
            rate_limit_read_ms: env_parsed("WIKIBOT_RATE_LIMIT_READ")
                .or(client.rate_limit_read_ms)
                .unwrap_or(defaults.rate_limit_read_ms),
            rate_limit_write_ms: env_parsed("WIKIBOT_RATE_LIMIT_WRITE")
                .or(client.rate_limit_write_ms)
                .unwrap_or(defaults.rate_limit_write_ms),
            max_retries: env_parsed("WIKIBOT_HTTP_RETRIES")
                .or(client.max_retries)
                .unwrap_or(defaults.max_retries),
            max_write_retries: env_parsed("WIKIBOT_HTTP_WRITE_RETRIES")
                .or(client.max_write_retries)
                .unwrap_or(defaults.max_write_retries),
            retry_delay_ms: env_parsed("WIKIBOT_HTTP_RETRY_DELAY_MS")
                .or(client.retry_delay_ms)
                .unwrap_or(defaults.retry_delay_ms),
        }
    }
}

/// Load and parse a BotConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BotConfig> {
    if !config_path.exists() {
        return Ok(BotConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BotConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_string(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, BotConfig::default());
    }

    #[test]
    fn load_config_parses_client_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[client]
user_agent = "test-agent/1.0"
timeout_ms = 5000
rate_limit_write_ms = 2500
max_retries = 4
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.client.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.client.timeout_ms, Some(5000));
        assert_eq!(config.client.rate_limit_write_ms, Some(2500));
        assert_eq!(config.client.max_retries, Some(4));
        assert!(config.client.retry_delay_ms.is_none());
    }

    #[test]
    fn load_config_tolerates_unrelated_tables() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[other]\nkey = \"value\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.client, ClientSection::default());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[client\ntimeout_ms = 1").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn client_settings_fall_back_to_file_values_then_defaults() {
        let config = BotConfig {
            client: ClientSection {
                rate_limit_read_ms: Some(42),
                max_write_retries: Some(3),
                ..ClientSection::default()
            },
        };
        let settings = config.client_settings();
        assert_eq!(settings.rate_limit_read_ms, 42);
        assert_eq!(settings.max_write_retries, 3);
        assert_eq!(settings.timeout_ms, 30_000);
        assert_eq!(settings.retry_delay_ms, 500);
    }
}
