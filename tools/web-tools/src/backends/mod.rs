//! Search backend implementations
//!
//! This module provides a trait-based abstraction for search backends.
//! Currently supports Serper (Google results over a JSON API).

use async_trait::async_trait;

use crate::error::WebToolResult;
use crate::types::SearchResults;

pub mod serper;

/// Trait for search backends
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Get the name of this backend
    fn name(&self) -> &str;

    /// Perform a web search, returning at most `limit` ranked results
    async fn search(&self, query: &str, limit: usize) -> WebToolResult<SearchResults>;

    /// Check if this backend is configured and available
    fn is_available(&self) -> bool;
}
