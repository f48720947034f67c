use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientSettings;
use crate::site::SiteConnection;

const API_BATCH_LIMIT: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllPagesQuery {
    pub namespace: i32,
    pub prefix: Option<String>,
    pub limit: Option<usize>,
}

pub trait WikiReadApi {
    /// The `query.namespaces` object of a siteinfo request.
    fn site_namespaces(&mut self, format_version: u8) -> Result<Value>;
    fn all_pages(&mut self, query: &AllPagesQuery) -> Result<Vec<String>>;
    /// Raw page bytes as stored on the wiki; not guaranteed to be valid UTF-8.
    fn page_text(&mut self, title: &str) -> Result<Vec<u8>>;
    fn page_categories(&mut self, title: &str) -> Result<Vec<String>>;
    fn category_members(&mut self, category: &str) -> Result<Vec<String>>;
    fn request_count(&self) -> usize;
}

pub trait WikiWriteApi: WikiReadApi {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<()>;
}

pub struct MediaWikiClient {
    client: Client,
    api_url: String,
    index_url: String,
    settings: ClientSettings,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(site: &SiteConnection, settings: ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            api_url: site.api_url(),
            index_url: site.index_url(),
            settings,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let pairs = api_pairs(params);
        let url = self.api_url.clone();
        let response = self.send_with_retry(false, |client| client.get(&url).query(&pairs))?;
        decode_api_payload(response)
    }

    fn request_json_post(&mut self, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        let pairs = api_pairs(params);
        let url = self.api_url.clone();
        let response = self.send_with_retry(is_write, |client| client.post(&url).form(&pairs))?;
        decode_api_payload(response)
    }

    fn send_with_retry<F>(&mut self, is_write: bool, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_retries = if is_write {
            self.settings.max_write_retries
        } else {
            self.settings.max_retries
        };

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let response = build(&self.client)
                .header("User-Agent", self.settings.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt < max_retries && is_retryable_status(status) {
                        debug!("HTTP {status}, retrying (attempt {})", attempt + 1);
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    bail!("MediaWiki request failed with HTTP {status}");
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        debug!("transport error, retrying (attempt {}): {error}", attempt + 1);
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.settings.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.settings.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .settings
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }

    fn collect_titles<F>(
        &mut self,
        base_params: Vec<(&'static str, String)>,
        continue_key: &'static str,
        limit: Option<usize>,
        extract: F,
    ) -> Result<Vec<String>>
    where
        F: Fn(QueryPayload) -> Vec<String>,
    {
        let mut titles = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut params = base_params.clone();
            if let Some(token) = &continue_token {
                params.push((continue_key, token.clone()));
            }

            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .with_context(|| format!("failed to decode API response ({continue_key})"))?;
            continue_token = absorb_batch(&mut titles, parsed, continue_key, limit, &extract);
            if continue_token.is_none() {
                break;
            }
        }

        Ok(titles)
    }
}

/// Append one batch of titles and pick the token for the next request.
/// `None` once the listing is exhausted or `limit` titles have been gathered.
fn absorb_batch<F>(
    titles: &mut Vec<String>,
    batch: QueryResponse,
    continue_key: &str,
    limit: Option<usize>,
    extract: &F,
) -> Option<String>
where
    F: Fn(QueryPayload) -> Vec<String>,
{
    titles.extend(extract(batch.query));
    if let Some(limit) = limit
        && titles.len() >= limit
    {
        titles.truncate(limit);
        return None;
    }
    batch
        .continuation
        .and_then(|cont| cont.token(continue_key))
}

impl WikiReadApi for MediaWikiClient {
    fn site_namespaces(&mut self, format_version: u8) -> Result<Value> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "siteinfo".to_string()),
            ("siprop", "namespaces".to_string()),
            ("formatversion", format_version.to_string()),
        ])?;
        response
            .pointer("/query/namespaces")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("siteinfo response has no query.namespaces"))
    }

    fn all_pages(&mut self, query: &AllPagesQuery) -> Result<Vec<String>> {
        let batch = query
            .limit
            .map_or(API_BATCH_LIMIT, |limit| limit.clamp(1, API_BATCH_LIMIT));
        let mut params = vec![
            ("action", "query".to_string()),
            ("list", "allpages".to_string()),
            ("apnamespace", query.namespace.to_string()),
            ("aplimit", batch.to_string()),
        ];
        if let Some(prefix) = &query.prefix {
            params.push(("apprefix", prefix.clone()));
        }
        self.collect_titles(params, "apcontinue", query.limit, |payload| {
            payload.allpages.into_iter().map(|item| item.title).collect()
        })
    }

    fn page_text(&mut self, title: &str) -> Result<Vec<u8>> {
        let url = self.index_url.clone();
        let query = [("title", title.to_string()), ("action", "raw".to_string())];
        let response = self
            .send_with_retry(false, |client| client.get(&url).query(&query))
            .with_context(|| format!("failed to fetch text of {title}"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read text of {title}"))?;
        Ok(bytes.to_vec())
    }

    fn page_categories(&mut self, title: &str) -> Result<Vec<String>> {
        let params = vec![
            ("action", "query".to_string()),
            ("prop", "categories".to_string()),
            ("titles", title.to_string()),
            ("cllimit", "max".to_string()),
        ];
        self.collect_titles(params, "clcontinue", None, |payload| {
            payload
                .pages
                .into_iter()
                .filter(|page| !page.missing.unwrap_or(false))
                .flat_map(|page| page.categories)
                .map(|item| item.title)
                .collect()
        })
    }

    fn category_members(&mut self, category: &str) -> Result<Vec<String>> {
        let params = vec![
            ("action", "query".to_string()),
            ("list", "categorymembers".to_string()),
            ("cmtitle", category_title(category)),
            ("cmlimit", API_BATCH_LIMIT.to_string()),
        ];
        self.collect_titles(params, "cmcontinue", None, |payload| {
            payload
                .categorymembers
                .into_iter()
                .map(|item| item.title)
                .collect()
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl WikiWriteApi for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json_post(
            &[
                ("action", "edit".to_string()),
                ("title", title.to_string()),
                ("text", content.to_string()),
                ("summary", summary.to_string()),
                ("bot", "1".to_string()),
                ("token", token),
            ],
            true,
        )?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                title,
                edit.result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }
}

pub fn category_title(category: &str) -> String {
    if category.starts_with("Category:") {
        category.to_string()
    } else {
        format!("Category:{category}")
    }
}

/// Edit fields that must reach the API even when blank.
const KEEP_EMPTY_PARAMS: [&str; 2] = ["text", "summary"];

fn api_pairs(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    if !params.iter().any(|(key, _)| *key == "formatversion") {
        pairs.push(("formatversion".to_string(), "2".to_string()));
    }
    for (key, value) in params {
        if !value.is_empty() || KEEP_EMPTY_PARAMS.contains(key) {
            pairs.push(((*key).to_string(), value.clone()));
        }
    }
    pairs
}

fn decode_api_payload(response: Response) -> Result<Value> {
    let payload: Value = response
        .json()
        .context("failed to decode MediaWiki API JSON response")?;
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(payload)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    allpages: Vec<TitleQueryItem>,
    #[serde(default)]
    categorymembers: Vec<TitleQueryItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    apcontinue: Option<String>,
    cmcontinue: Option<String>,
    clcontinue: Option<String>,
}

impl ContinuationPayload {
    fn token(self, key: &str) -> Option<String> {
        match key {
            "apcontinue" => self.apcontinue,
            "cmcontinue" => self.cmcontinue,
            "clcontinue" => self.clcontinue,
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TitleQueryItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    missing: Option<bool>,
    #[serde(default)]
    categories: Vec<TitleQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
