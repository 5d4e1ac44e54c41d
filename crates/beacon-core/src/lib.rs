//! Core types, configuration, and paths for the Beacon SDK.

mod config;
mod error;
mod paths;
mod payload;

pub use config::{
    Config, QueueConfig, DEFAULT_API_HOST, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS,
    DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_FLUSH_SIZE, DEFAULT_LOG_LEVEL, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_SEND_TIMEOUT_MS, DEFAULT_STORAGE_KEY,
};
pub use error::{CoreError, CoreResult};
pub use paths::Paths;
pub use payload::{EventPayload, EventPayloadBuilder, Properties};
