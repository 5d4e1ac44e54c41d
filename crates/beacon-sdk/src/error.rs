//! Tracker construction errors.

use thiserror::Error;

/// Errors raised while building a tracker. Tracking itself never fails.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] beacon_core::CoreError),

    /// Persistence could not be opened
    #[error("Store error: {0}")]
    Store(#[from] beacon_store::StoreError),

    /// Transport could not be created
    #[error("Transport error: {0}")]
    Outbox(#[from] beacon_outbox::OutboxError),
}

/// Result type alias using TrackerError.
pub type TrackerResult<T> = Result<T, TrackerError>;
