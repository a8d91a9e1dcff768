//! Errors raised by the search and scrape capabilities

use thiserror::Error;

pub type WebToolResult<T> = Result<T, WebToolError>;

#[derive(Debug, Error)]
pub enum WebToolError {
    #[error("{backend} is not configured: {reason}")]
    NotConfigured { backend: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl WebToolError {
    /// Build a status error, keeping at most 200 bytes of the body
    pub fn status(status: u16, body: &str) -> Self {
        let end = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= 200)
            .last()
            .unwrap_or(0);
        let body = if body.len() > 200 { &body[..end] } else { body };
        Self::Status {
            status,
            body: body.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_truncates_body() {
        let body = "x".repeat(500);
        match WebToolError::status(502, &body) {
            WebToolError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.len() <= 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_short_body_kept() {
        let err = WebToolError::status(404, "not found");
        assert_eq!(err.to_string(), "HTTP error 404: not found");
    }
}
