//! Common types for search and scrape results

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single web search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The title of the result
    pub title: String,
    /// The URL of the result
    pub url: String,
    /// A description or snippet of the result
    pub description: String,
    /// 1-based rank reported by the provider
    pub position: usize,
}

/// A collection of search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// The search query that was executed
    pub query: String,
    /// The search results, best first
    pub results: Vec<SearchResult>,
    /// The backend that was used
    pub backend: String,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl fmt::Display for SearchResults {
    /// Plain-text listing handed back to the language model
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.results.is_empty() {
            return write!(f, "No results found for '{}'.", self.query);
        }
        writeln!(f, "Search results for '{}':", self.query)?;
        for result in &self.results {
            writeln!(f, "---")?;
            writeln!(f, "Title: {}", result.title)?;
            writeln!(f, "Link: {}", result.url)?;
            writeln!(f, "Snippet: {}", result.description)?;
        }
        write!(f, "---")
    }
}

/// Readable content of a fetched page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPage {
    /// The fetched URL
    pub url: String,
    /// HTTP status code
    pub status_code: u16,
    /// Contents of the `<title>` element, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Visible text with whitespace collapsed
    pub text: String,
    /// Whether `text` was cut at the configured limit
    pub truncated: bool,
}
