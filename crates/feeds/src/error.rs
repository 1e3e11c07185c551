//! Error types for feed operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching candles.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Insufficient data: {rows} usable rows")]
    InsufficientData { rows: usize },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("No endpoints configured")]
    NoEndpoints,
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::RequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16) -> Self {
        match status {
            // Binance answers 418 once an IP is banned for ignoring 429s
            429 | 418 => FeedError::RateLimitExceeded,
            other => FeedError::HttpStatus(other),
        }
    }

    /// Returns true if retrying the same request later is likely to succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::RequestFailed(_)
            | FeedError::Timeout(_)
            | FeedError::RateLimitExceeded
            | FeedError::InsufficientData { .. } => true,
            FeedError::HttpStatus(status) => *status >= 500,
            FeedError::ParseError(_) | FeedError::NoEndpoints => false,
        }
    }

    /// Suggested wait before hitting the same endpoint again.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            FeedError::RateLimitExceeded => Some(Duration::from_secs(60)),
            FeedError::RequestFailed(_) | FeedError::Timeout(_) => Some(Duration::from_secs(5)),
            FeedError::HttpStatus(status) if *status >= 500 => Some(Duration::from_secs(5)),
            _ => None,
        }
    }
}
