//! Error types for genagenta-agent

use thiserror::Error;

/// Result type alias using genagenta-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that escape the agent loop.
///
/// Tool failures never appear here; they are converted into error-shaped tool
/// results and fed back to the model.
#[derive(Error, Debug)]
pub enum Error {
    /// A fatal error from the provider layer
    #[error(transparent)]
    Ai(#[from] genagenta_ai::Error),

    /// Resume context failed validation
    #[error("invalid resume context: {0}")]
    InvalidResume(String),

    /// The tool-call/tool-result pairing contract was violated
    #[error("tool protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    /// HTTP status an HTTP surface should map this error to
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Ai(e) => e.http_status(),
            Error::InvalidResume(_) => 400,
            Error::Protocol(_) => 500,
        }
    }
}
