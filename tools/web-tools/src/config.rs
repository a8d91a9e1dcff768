//! Configuration for the search and scrape capabilities
//!
//! Both sections deserialize from the `[search]` and `[scrape]` tables of the
//! crew configuration file. Missing keys fall back to the defaults below.
//! The search API key is never part of the file; it comes from the
//! environment and is passed to the backend constructor separately.

use serde::{Deserialize, Serialize};

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Serper endpoint
    #[serde(default = "default_serper_url")]
    pub url: String,
    /// Maximum number of results to return
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Country code passed to the search provider (empty = provider default)
    #[serde(default)]
    pub country: String,
    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Scrape (HTTP fetch) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Largest response body accepted, in bytes
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Page text longer than this is truncated before it reaches the agent
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_serper_url() -> String {
    "https://google.serper.dev/search".to_string()
}

fn default_max_results() -> usize {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_max_response_size() -> usize {
    5 * 1024 * 1024
}

fn default_user_agent() -> String {
    concat!("web-tools/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_text_chars() -> usize {
    20_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_serper_url(),
            max_results: default_max_results(),
            country: String::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_response_size: default_max_response_size(),
            user_agent: default_user_agent(),
            max_text_chars: default_max_text_chars(),
        }
    }
}
