//! Web search probe backed by Serper.
//!
//! The supervisor queries this for documentation about the collector's
//! upstream endpoint. Hits are only logged and counted; they never feed
//! into a patch decision.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::{Result, USER_AGENT};

/// Default Serper search endpoint
pub const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Anything that can answer a search query.
#[async_trait]
pub trait SearchProbe: Send + Sync {
    /// Run `query` and return at most `max_results` hits.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Serper connection settings
#[derive(Debug, Clone)]
pub struct SerperConfig {
    /// Search endpoint URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for SerperConfig {
    fn default() -> Self {
        SerperConfig {
            endpoint: SERPER_ENDPOINT.to_string(),
            timeout: Duration::from_secs(25),
        }
    }
}

/// Serper HTTP client
pub struct SerperClient {
    config: SerperConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for SerperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperClient")
            .field("endpoint", &self.config.endpoint)
            .field("api_key", &"***")
            .finish()
    }
}

impl SerperClient {
    /// Create a new Serper client.
    ///
    /// Fails with [`ProbeError::MissingApiKey`] when `api_key` is blank.
    pub fn new(api_key: impl Into<String>, config: SerperConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProbeError::MissingApiKey("serper".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(SerperClient {
            config,
            api_key,
            http_client,
        })
    }
}

#[async_trait]
impl SearchProbe for SerperClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let payload = json!({ "q": query, "num": max_results });

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::UnexpectedStatus {
                service: "serper".to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let mut hits = parse_serper_response(&body)?;
        hits.truncate(max_results);
        debug!(query = %query, hits = hits.len(), "serper query answered");
        Ok(hits)
    }
}

/// Extract the organic hits from a Serper response body.
///
/// A missing or `null` `organic` field yields no hits. Entries without a
/// usable `title` and `link` are skipped; the rest are kept.
pub fn parse_serper_response(body: &Value) -> Result<Vec<SearchHit>> {
    let entries: Vec<Value> = match body.get("organic") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(organic) => serde_json::from_value(organic.clone())?,
    };

    let hits = entries
        .into_iter()
        .enumerate()
        .filter_map(|(rank, entry)| match serde_json::from_value::<SearchHit>(entry) {
            Ok(hit) => Some(hit),
            Err(e) => {
                debug!(rank = rank + 1, error = %e, "skipping malformed search hit");
                None
            }
        })
        .collect();
    Ok(hits)
}

/// Run every query in turn, pausing `interval` between queries.
///
/// Errors are logged and swallowed; the returned list holds whatever the
/// successful queries produced.
pub async fn collect_references(
    probe: &dyn SearchProbe,
    queries: &[String],
    max_results: usize,
    interval: Duration,
) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    for (i, query) in queries.iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }

        info!(query = %query, "searching");
        match probe.search(query, max_results).await {
            Ok(found) => {
                for (n, hit) in found.iter().enumerate() {
                    info!(rank = n + 1, title = %hit.title, link = %hit.link, "search hit");
                }
                hits.extend(found);
            }
            Err(e) => warn!(query = %query, error = %e, "search failed"),
        }
    }

    hits
}
