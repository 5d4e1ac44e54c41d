//! Durable snapshots of the pending delivery queue.
//!
//! This crate provides:
//! - [`EventStore`]: synchronous key-value style store (`save` / `load`)
//! - [`AsyncEventStore`]: store that can only be read asynchronously and is
//!   restored once at queue startup
//! - Adapters: [`MemoryStore`], [`JsonFileStore`], [`SqliteStore`],
//!   [`AsyncSqliteStore`]
//!
//! Store failures never reach the caller. A snapshot that cannot be read is
//! treated as empty; a snapshot that cannot be written leaves the queue
//! running in memory only.

mod async_sqlite;
mod error;
mod file;
mod memory;
mod migrations;
mod sqlite;
mod traits;

pub use async_sqlite::AsyncSqliteStore;
pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use sqlite::SqliteStore;
pub use traits::{AsyncEventStore, EventStore};
