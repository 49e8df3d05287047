//! Error types for feed operations.

use thiserror::Error;

/// Errors that can occur while fetching prices.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No price for asset: {0}")]
    UnknownAsset(String),

    #[error("Invalid feed configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::UpstreamUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::UpstreamUnavailable(_))
    }
}
