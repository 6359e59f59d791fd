//! Error types for genagenta-ai

use thiserror::Error;

/// Result type alias using genagenta-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the provider adapters.
///
/// Transport and rate-limit errors are fatal to a request; the orchestrator
/// never retries them internally. Content blocks carry the vendor's reason.
#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure talking to the vendor (no usable response)
    #[error("vendor transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP 429 from the vendor; distinguished so callers can advise a retry
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
    },

    /// Safety/recitation block from the vendor
    #[error("content blocked by {provider}: {reason}")]
    ContentBlocked {
        provider: &'static str,
        reason: String,
    },

    /// Non-2xx API response that is not a rate limit
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response arrived but did not have the expected shape
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an API error from status and body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the caller could usefully retry shortly
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Whether the vendor refused the content outright
    pub fn is_content_blocked(&self) -> bool {
        matches!(self, Error::ContentBlocked { .. })
    }

    /// HTTP status an HTTP surface should map this error to. Vendor failures
    /// other than rate limits and content blocks all surface as 500 with the
    /// vendor detail in the message.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::RateLimited { .. } => 429,
            Error::ContentBlocked { .. } => 400,
            _ => 500,
        }
    }
}
