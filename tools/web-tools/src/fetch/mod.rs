//! HTTP fetch service backing the scrape capability
//!
//! Fetches a page and reduces the HTML to the visible text an agent can
//! read: `<script>`/`<style>` blocks removed, whitespace collapsed, long
//! pages truncated.

use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::ScrapeConfig;
use crate::error::{WebToolError, WebToolResult};
use crate::types::ScrapedPage;

static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid style pattern"));
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid script pattern")
});
static NOSCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<noscript[^>]*>.*?</noscript>").expect("valid noscript pattern")
});

/// HTTP fetch service with configurable client
#[derive(Clone)]
pub struct ScrapeService {
    client: Client,
    config: ScrapeConfig,
}

impl ScrapeService {
    /// Create a new ScrapeService with the given configuration
    pub fn new(config: &ScrapeConfig) -> WebToolResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Fetch a URL and return its body as text
    async fn fetch(&self, url: &str) -> WebToolResult<(u16, String)> {
        let parsed = url::Url::parse(url).map_err(|e| WebToolError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WebToolError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let response = self.client.get(parsed).send().await?;
        let status_code = response.status().as_u16();

        // Check Content-Length before downloading
        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_response_size {
                return Err(WebToolError::TooLarge {
                    size: len as usize,
                    max: self.config.max_response_size,
                });
            }
        }

        let content = response.text().await?;
        if content.len() > self.config.max_response_size {
            return Err(WebToolError::TooLarge {
                size: content.len(),
                max: self.config.max_response_size,
            });
        }

        if status_code >= 400 {
            return Err(WebToolError::status(status_code, &content));
        }

        Ok((status_code, content))
    }

    /// Fetch a URL and extract its readable text
    pub async fn scrape(&self, url: &str) -> WebToolResult<ScrapedPage> {
        let (status_code, html) = self.fetch(url).await?;
        let (title, text) = html_to_text(&html);
        let (text, truncated) = truncate_chars(text, self.config.max_text_chars);

        tracing::debug!(url, status_code, chars = text.len(), truncated, "scraped page");

        Ok(ScrapedPage {
            url: url.to_string(),
            status_code,
            title,
            text,
            truncated,
        })
    }
}

/// Reduce an HTML document to its title and visible text
pub fn html_to_text(html: &str) -> (Option<String>, String) {
    let cleaned = STYLE_RE.replace_all(html, "");
    let cleaned = SCRIPT_RE.replace_all(&cleaned, "");
    let cleaned = NOSCRIPT_RE.replace_all(&cleaned, "");

    let document = scraper::Html::parse_document(&cleaned);

    let title = scraper::Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        })
        .filter(|t| !t.is_empty());

    let text = match scraper::Selector::parse("body") {
        Ok(selector) => match document.select(&selector).next() {
            Some(body) => body.text().collect::<Vec<_>>().join(" "),
            None => document.root_element().text().collect::<Vec<_>>().join(" "),
        },
        Err(_) => document.root_element().text().collect::<Vec<_>>().join(" "),
    };

    (title, collapse_whitespace(&text))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text, false),
    }
}
