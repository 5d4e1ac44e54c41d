//! Outbox error types.

use thiserror::Error;

/// Errors raised while building outbox components.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid ingestion endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] beacon_core::CoreError),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Failure kinds reported by a transport instead of a delivery verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The account's event quota is used up; terminal for this session.
    #[error("Event quota exhausted")]
    QuotaExhausted,

    /// The batch was rejected and must not be resent.
    #[error("Batch rejected with HTTP {status}: {body}")]
    NonRetryable { status: u16, body: String },

    /// Server error or network failure.
    #[error("Send failed: {0}")]
    Retryable(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Retryable(_))
    }
}
