use anyhow::{Context, Result};
use tracing::{error, info};

use crate::client::{MediaWikiClient, WikiReadApi, WikiWriteApi};
use crate::config::ClientSettings;
use crate::namespaces::NamespaceMap;
use crate::site::{SiteConnection, SiteProfile, SiteVariant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    pub diagnostic: Option<String>,
}

/// A connection to one wiki. Owns the API client and the namespace map fetched
/// on first use.
pub struct WikiBot<A> {
    api: A,
    site: SiteConnection,
    profile: SiteProfile,
    namespaces: Option<NamespaceMap>,
    logged_in: bool,
}

impl WikiBot<MediaWikiClient> {
    pub fn open(
        variant: SiteVariant,
        site: SiteConnection,
        settings: ClientSettings,
    ) -> Result<Self> {
        let api = MediaWikiClient::new(&site, settings)
            .with_context(|| format!("failed to connect to {}", site.url()))?;
        Ok(Self::connect(site, variant.profile(), api))
    }
}

impl<A: WikiReadApi> WikiBot<A> {
    pub fn connect(site: SiteConnection, profile: SiteProfile, api: A) -> Self {
        info!("Connected to site '{}'.", site.url());
        Self {
            api,
            site,
            profile,
            namespaces: None,
            logged_in: false,
        }
    }

    pub fn url(&self) -> String {
        self.site.url()
    }

    pub fn hostname(&self) -> &str {
        &self.site.hostname
    }

    pub fn path(&self) -> &str {
        &self.site.path
    }

    pub fn wikifarm(&self) -> Option<&'static str> {
        self.profile.farm
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn namespaces(&mut self) -> Result<&NamespaceMap> {
        if self.namespaces.is_none() {
            let key = self.profile.namespace_key;
            let raw = self
                .api
                .site_namespaces(self.profile.namespace_format_version())
                .context("failed to query site namespaces")?;
            let map = NamespaceMap::from_siteinfo(&raw, key)?;
            self.namespaces = Some(map);
        }
        self.namespaces
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("namespace map not initialized"))
    }
}

impl<A: WikiWriteApi> WikiBot<A> {
    pub fn login(&mut self, username: &str, password: &str) -> LoginOutcome {
        let result = if username.is_empty() || password.is_empty() {
            Err(anyhow::anyhow!("missing username or password"))
        } else {
            self.api.login(username, password)
        };

        match result {
            Ok(()) => {
                self.logged_in = true;
                info!("User '{username}' has successfully logged in.");
                LoginOutcome {
                    success: true,
                    diagnostic: None,
                }
            }
            Err(error) => {
                self.logged_in = false;
                error!("User '{username}' has failed to log in: {error:#}");
                LoginOutcome {
                    success: false,
                    diagnostic: Some(format!("{error:#}")),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use anyhow::{Result, bail};
    use serde_json::{Value, json};

    use super::WikiBot;
    use crate::client::{AllPagesQuery, WikiReadApi, WikiWriteApi};
    use crate::site::{SiteConnection, SiteVariant};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedEdit {
        pub title: String,
        pub content: String,
        pub summary: String,
    }

    #[derive(Default)]
    pub struct MockApi {
        pub namespaces: Option<Value>,
        pub pages_by_namespace: BTreeMap<i32, Vec<String>>,
        pub texts: BTreeMap<String, Vec<u8>>,
        pub categories: BTreeMap<String, Vec<String>>,
        pub failing_titles: Vec<String>,
        pub failing_edits: Vec<String>,
        pub accepted_password: Option<String>,
        pub edits: Vec<RecordedEdit>,
        pub namespace_requests: usize,
        pub login_requests: usize,
        pub request_count: usize,
    }

    impl MockApi {
        pub fn with_page(mut self, namespace: i32, title: &str, text: &str) -> Self {
            self.pages_by_namespace
                .entry(namespace)
                .or_default()
                .push(title.to_string());
            self.texts
                .insert(title.to_string(), text.as_bytes().to_vec());
            self
        }

        pub fn with_categories(mut self, title: &str, categories: &[&str]) -> Self {
            self.categories.insert(
                title.to_string(),
                categories.iter().map(ToString::to_string).collect(),
            );
            self
        }
    }

    impl WikiReadApi for MockApi {
        fn site_namespaces(&mut self, _format_version: u8) -> Result<Value> {
            self.request_count += 1;
            self.namespace_requests += 1;
            Ok(self.namespaces.clone().unwrap_or_else(|| {
                json!({
                    "0": {"id": 0, "name": ""},
                    "1": {"id": 1, "name": "Talk"},
                    "10": {"id": 10, "name": "Template"},
                    "14": {"id": 14, "name": "Category"}
                })
            }))
        }

        fn all_pages(&mut self, query: &AllPagesQuery) -> Result<Vec<String>> {
            self.request_count += 1;
            let titles = self
                .pages_by_namespace
                .get(&query.namespace)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|title| {
                    query
                        .prefix
                        .as_deref()
                        .is_none_or(|prefix| title.starts_with(prefix))
                });
            Ok(match query.limit {
                Some(limit) => titles.take(limit).collect(),
                None => titles.collect(),
            })
        }

        fn page_text(&mut self, title: &str) -> Result<Vec<u8>> {
            self.request_count += 1;
            if self.failing_titles.iter().any(|failing| failing == title) {
                bail!("MediaWiki request failed with HTTP 503 Service Unavailable");
            }
            match self.texts.get(title) {
                Some(text) => Ok(text.clone()),
                None => bail!("MediaWiki request failed with HTTP 404 Not Found"),
            }
        }

        fn page_categories(&mut self, title: &str) -> Result<Vec<String>> {
            self.request_count += 1;
            Ok(self.categories.get(title).cloned().unwrap_or_default())
        }

        fn category_members(&mut self, category: &str) -> Result<Vec<String>> {
            self.request_count += 1;
            let wanted = crate::client::category_title(category);
            Ok(self
                .categories
                .iter()
                .filter(|(_, categories)| categories.iter().any(|name| *name == wanted))
                .map(|(title, _)| title.clone())
                .collect())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    impl WikiWriteApi for MockApi {
        fn login(&mut self, _username: &str, password: &str) -> Result<()> {
            self.request_count += 1;
            self.login_requests += 1;
            match &self.accepted_password {
                Some(accepted) if accepted == password => Ok(()),
                _ => bail!("MediaWiki login failed: Incorrect username or password entered."),
            }
        }

        fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<()> {
            self.request_count += 1;
            if self.failing_edits.iter().any(|failing| failing == title) {
                bail!("MediaWiki API error [readonly]: The wiki is currently in read-only mode.");
            }
            self.texts
                .insert(title.to_string(), content.as_bytes().to_vec());
            self.edits.push(RecordedEdit {
                title: title.to_string(),
                content: content.to_string(),
                summary: summary.to_string(),
            });
            Ok(())
        }
    }

    pub fn bot(api: MockApi) -> WikiBot<MockApi> {
        WikiBot::connect(
            SiteConnection::new("wiki.example.org", "/w/", true),
            SiteVariant::Standalone.profile(),
            api,
        )
    }
}
