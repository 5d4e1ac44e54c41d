//! Beacon SDK: capture product-analytics events from a native host.
//!
//! A [`Tracker`] turns tracking calls into immutable event payloads and hands
//! them to a [`DeliveryQueue`](beacon_outbox::DeliveryQueue). Tracking calls
//! never block on the network and never return errors.
//!
//! ```ignore
//! let tracker = Tracker::builder("phc_key")
//!     .sqlite_store(paths.queue_database_file())
//!     .build()?;
//!
//! tracker.identify("user-42", None);
//! tracker.capture("report_exported", Some(props));
//!
//! tracker.shutdown(Duration::from_secs(3)).await;
//! ```

mod context;
mod error;
mod tracker;

pub use context::{ContextProvider, StaticContext, LIB_NAME, LIB_VERSION};
pub use error::{TrackerError, TrackerResult};
pub use tracker::{Tracker, TrackerBuilder};

pub use beacon_core::{EventPayload, Properties};
pub use beacon_outbox::{FlushOutcome, QueueStats};
