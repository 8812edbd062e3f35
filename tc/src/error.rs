//! Collector error types

use thiserror::Error;

/// Errors that can occur while delivering a report to the collector
///
/// The collector client never retries; `is_retryable` exists so callers can
/// decide for themselves.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector client is not connected")]
    NotConnected,

    #[error("Invalid collector URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Collector returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Collector answered over {version}, HTTP/2 required")]
    NotHttp2 { version: String },

    #[error("Failed to encode report request: {0}")]
    Encode(#[source] postcard::Error),

    #[error("Failed to decode report response: {0}")]
    Decode(#[source] postcard::Error),
}

impl CollectorError {
    /// Check if this error is transient
    pub fn is_retryable(&self) -> bool {
        match self {
            CollectorError::Network(e) => e.is_timeout() || e.is_connect(),
            CollectorError::Status { status, .. } => *status >= 500 || *status == 429,
            CollectorError::NotConnected => false,
            CollectorError::InvalidUrl { .. } => false,
            CollectorError::NotHttp2 { .. } => false,
            CollectorError::Encode(_) => false,
            CollectorError::Decode(_) => false,
        }
    }

    /// Check if this error came from a request that exceeded the report timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, CollectorError::Network(e) if e.is_timeout())
    }
}
