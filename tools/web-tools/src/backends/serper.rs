//! Serper backend
//!
//! Implements the SearchBackend trait using the Serper Google search API.
//! See: https://serper.dev

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::SearchBackend;
use crate::config::SearchConfig;
use crate::error::{WebToolError, WebToolResult};
use crate::types::{SearchResult, SearchResults};

/// Serper backend
pub struct SerperBackend {
    client: Client,
    config: SearchConfig,
    api_key: String,
}

impl SerperBackend {
    pub fn new(config: SearchConfig, api_key: impl Into<String>) -> WebToolResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("web-tools/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
    #[serde(skip_serializing_if = "str::is_empty")]
    gl: &'a str,
}

// Serper API response types
#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    title: String,
    link: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    position: Option<usize>,
}

fn into_results(query: &str, response: SerperResponse, limit: usize) -> SearchResults {
    let results = response
        .organic
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, r)| SearchResult {
            title: r.title,
            url: r.link,
            description: r.snippet.unwrap_or_default(),
            position: r.position.unwrap_or(i + 1),
        })
        .collect();

    SearchResults {
        query: query.to_string(),
        results,
        backend: "serper".to_string(),
    }
}

#[async_trait]
impl SearchBackend for SerperBackend {
    fn name(&self) -> &str {
        "serper"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty() && !self.config.url.is_empty()
    }

    async fn search(&self, query: &str, limit: usize) -> WebToolResult<SearchResults> {
        if !self.is_available() {
            return Err(WebToolError::NotConfigured {
                backend: self.name().to_string(),
                reason: "API key or endpoint missing".to_string(),
            });
        }

        let limit = limit.min(self.config.max_results).max(1);
        tracing::debug!(query, limit, "serper search");

        let response = self
            .client
            .post(&self.config.url)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: query,
                num: limit,
                gl: &self.config.country,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(WebToolError::status(status, &text));
        }

        let serper_response: SerperResponse = response
            .json()
            .await
            .map_err(|e| WebToolError::Decode(e.to_string()))?;

        Ok(into_results(query, serper_response, limit))
    }
}
