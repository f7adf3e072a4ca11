use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{citation::RawRecord, config::SearchSettings};

/// Upper bound on records returned by any searcher.
pub const MAX_SEARCH_RESULTS: usize = 15;

/// Errors emitted while calling a search provider.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Request could not be sent or timed out.
    #[error("search transport error: {0}")]
    Transport(String),
    /// Provider answered with a non-success status.
    #[error("search provider returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },
    /// Response body was not the expected JSON shape.
    #[error("search response malformed: {0}")]
    Decode(String),
    /// Any other provider failure.
    #[error("search provider error: {0}")]
    Provider(String),
}

/// Capability the pipeline needs from a web search collaborator.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Returns raw, unnormalized result records for `query`.
    async fn search(&self, query: &str) -> Result<Vec<RawRecord>, SearchError>;
}

/// Offline searcher returning a fixed documentation corpus.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubSearcher;

impl StubSearcher {
    /// Records returned for every query.
    #[must_use]
    pub fn records() -> Vec<RawRecord> {
        [
            json!({
                "title": "Example: Python asyncio documentation",
                "url": "https://docs.python.org/3/library/asyncio.html",
                "snippet": "asyncio is used as a foundation for multiple Python asynchronous frameworks.",
                "published_at": null,
                "source_name": "Python Docs",
            }),
            json!({
                "title": "Example: FastAPI Concurrency",
                "url": "https://fastapi.tiangolo.com/async/",
                "snippet": "FastAPI supports async def endpoints for non-blocking I/O.",
                "published_at": null,
                "source_name": "FastAPI",
            }),
            json!({
                "title": "Example: HTTPX async client",
                "url": "https://www.python-httpx.org/async/",
                "snippet": "Use httpx.AsyncClient() for async HTTP requests.",
                "published_at": null,
                "source_name": "HTTPX",
            }),
        ]
        .into_iter()
        .filter_map(|value| value.as_object().cloned())
        .collect()
    }
}

#[async_trait]
impl Searcher for StubSearcher {
    async fn search(&self, _query: &str) -> Result<Vec<RawRecord>, SearchError> {
        Ok(Self::records())
    }
}

/// Searcher backed by the You.com search API.
#[derive(Debug, Clone)]
pub struct YouSearcher {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
}

impl YouSearcher {
    /// Builds a client from settings.
    pub fn new(settings: &SearchSettings) -> Result<Self, SearchError> {
        let client = Client::builder()
            .user_agent("liveproof-verification/0.1")
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|err| SearchError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|key| !key.is_empty()),
            max_results: settings.max_results.clamp(1, MAX_SEARCH_RESULTS),
        })
    }
}

#[async_trait]
impl Searcher for YouSearcher {
    async fn search(&self, query: &str) -> Result<Vec<RawRecord>, SearchError> {
        let url = format!("{}/search", self.base_url);
        tracing::debug!(%url, query, "search request");
        let mut request = self.client.get(&url).query(&[("query", query)]);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| SearchError::Decode(err.to_string()))?;
        parse_search_response(&payload, self.max_results)
    }
}

/// Extracts result records from a provider payload.
///
/// Looks in `results` (array, or object holding `web`), then `web_results`. Keeps objects carrying
/// a `url` or `link`; when none do, keeps every object under `results`. Caps at `limit`.
/// A non-null top-level `error` is reported as [`SearchError::Provider`].
pub fn parse_search_response(payload: &Value, limit: usize) -> Result<Vec<RawRecord>, SearchError> {
    let root = payload
        .as_object()
        .ok_or_else(|| SearchError::Decode("expected a JSON object".into()))?;
    if let Some(message) = provider_error(root) {
        return Err(SearchError::Provider(message));
    }
    let items = result_items(root);

    let mut records: Vec<RawRecord> = items
        .iter()
        .filter_map(Value::as_object)
        .filter(|item| has_link(item))
        .cloned()
        .collect();
    if records.is_empty() {
        if let Some(Value::Array(results)) = root.get("results") {
            records = results.iter().filter_map(Value::as_object).cloned().collect();
        }
    }
    records.truncate(limit);
    Ok(records)
}

fn result_items(root: &serde_json::Map<String, Value>) -> &[Value] {
    match root.get("results") {
        Some(Value::Array(items)) => return items,
        Some(Value::Object(grouped)) => {
            if let Some(Value::Array(items)) = grouped.get("web") {
                return items;
            }
        }
        _ => {}
    }
    match root.get("web_results") {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

fn provider_error(root: &serde_json::Map<String, Value>) -> Option<String> {
    match root.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(detail) => Some(
            detail
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| Value::Object(detail.clone()).to_string(), str::to_string),
        ),
        other => Some(other.to_string()),
    }
}

fn has_link(item: &RawRecord) -> bool {
    ["url", "link"].iter().any(|key| {
        item.get(*key)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.is_empty())
    })
}
