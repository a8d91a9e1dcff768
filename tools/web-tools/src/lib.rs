//! Web Tools Library
//!
//! The two external capabilities crew agents can use:
//! - **search**: query string → ranked results (Serper backend)
//! - **scrape**: URL → readable page text
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use web_tools::{backends::serper::SerperBackend, SearchBackend, ScrapeService};
//!
//! let backend = SerperBackend::new(config.search.clone(), api_key)?;
//! let results = backend.search("conference venues san francisco", 5).await?;
//!
//! let scraper = ScrapeService::new(&config.scrape)?;
//! let page = scraper.scrape(&results.results[0].url).await?;
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod fetch;
pub mod types;

pub use backends::SearchBackend;
pub use config::{ScrapeConfig, SearchConfig};
pub use error::{WebToolError, WebToolResult};
pub use fetch::ScrapeService;
pub use types::{ScrapedPage, SearchResult, SearchResults};
