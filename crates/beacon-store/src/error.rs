//! Store error types.

use thiserror::Error;

/// Error raised inside a store adapter.
///
/// Never crosses the [`EventStore`](crate::EventStore) boundary: adapters log
/// it and degrade to "nothing saved" / "nothing restored".
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Async executor connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Snapshot could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
