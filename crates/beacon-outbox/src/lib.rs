//! Reliable batched delivery of analytics events.
//!
//! This crate provides:
//! - DeliveryQueue: bounded in-memory queue with retry, backoff and a
//!   teardown-safe unload path, mirrored to a persistence adapter
//! - Transport / HttpTransport: one network send per batch, with outcomes
//!   classified as delivered, retryable, non-retryable or quota-exhausted
//! - Backoff: lazily evaluated exponential backoff window

mod backoff;
mod error;
mod queue;
mod sender;

pub use backoff::{compute_backoff, Backoff};
pub use error::{OutboxError, OutboxResult, TransportError};
pub use queue::{DeliveryQueue, FlushOutcome, QueueStats, SkipReason};
pub use sender::{
    batch_endpoint, classify_response, HttpTransport, SendOptions, Transport, UNLOAD_BODY_LIMIT,
};
