//! Grounding search used by the pre-fill firewall.

use super::{SearchHit, SearchProvider, SearchResults};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub enabled: bool,
    /// Aggregating search endpoint, queried as `GET {endpoint}?q=..&limit=..`.
    pub endpoint: String,
    /// Optional environment variable holding a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key_env: None,
            timeout_secs: 10,
        }
    }
}

/// Search against an HTTP aggregator returning
/// `{"combined": [...], "<provider>": [...], ...}`.
pub struct HttpSearchProvider {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
}

impl HttpSearchProvider {
    pub fn new(config: &SearchConfig) -> Result<Self, CollaboratorError> {
        let endpoint = url::Url::parse(&config.endpoint).map_err(|e| CollaboratorError::Malformed {
            what: "search endpoint".to_string(),
            message: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Verdict/0.3")
            .build()
            .map_err(|e| CollaboratorError::Http {
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<SearchResults, CollaboratorError> {
        let url = format!(
            "{}?q={}&limit={}",
            self.endpoint.as_str().trim_end_matches('?'),
            urlencoding::encode(query),
            limit
        );
        debug!(url = %url, "Running grounding search");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| CollaboratorError::Http {
            message: format!("Search request failed: {e}"),
        })?;
        if !response.status().is_success() {
            return Err(CollaboratorError::Http {
                message: format!("Search returned HTTP {}", response.status()),
            });
        }
        let body: Value = response.json().await.map_err(|e| CollaboratorError::Malformed {
            what: "search response".to_string(),
            message: e.to_string(),
        })?;

        parse_search_body(&body, limit)
    }
}

fn parse_hits(value: &Value) -> Vec<SearchHit> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<SearchHit>(item.clone()).ok())
                .filter(|hit| !hit.url.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Split an aggregator response into the merged list and per-provider lists.
///
/// When the body has no `combined` list, one is built from the provider lists
/// in key order, deduplicated by url.
pub(crate) fn parse_search_body(body: &Value, limit: usize) -> Result<SearchResults, CollaboratorError> {
    let object = body.as_object().ok_or_else(|| CollaboratorError::Malformed {
        what: "search response".to_string(),
        message: "expected a JSON object".to_string(),
    })?;

    let mut by_provider = BTreeMap::new();
    for (key, value) in object {
        if key != "combined" && value.is_array() {
            by_provider.insert(key.clone(), parse_hits(value));
        }
    }

    let candidates: Vec<SearchHit> = match object.get("combined") {
        Some(combined) => parse_hits(combined),
        None => by_provider.values().flatten().cloned().collect(),
    };

    let mut seen = HashSet::new();
    let combined = candidates
        .into_iter()
        .filter(|hit| seen.insert(hit.url.clone()))
        .take(limit)
        .collect();

    Ok(SearchResults {
        combined,
        by_provider,
    })
}

/// Used when no search endpoint is configured: always returns no evidence.
pub struct NoopSearchProvider;

#[async_trait]
impl SearchProvider for NoopSearchProvider {
    async fn search(&self, _query: &str, _limit: usize) -> Result<SearchResults, CollaboratorError> {
        Ok(SearchResults::default())
    }
}
