//! Store trait definitions.

use async_trait::async_trait;
use beacon_core::EventPayload;

/// Synchronous durable snapshot of the pending queue.
///
/// Implementations must not fail outward: `save` swallows (and logs) write
/// errors, `load` returns an empty list when nothing usable is stored.
///
/// `save` is called on the caller's thread while the queue state is locked,
/// so it must be short. Slow or remote I/O belongs behind [`AsyncEventStore`].
pub trait EventStore: Send + Sync {
    /// Overwrite the snapshot with exactly `events`. An empty slice clears it.
    fn save(&self, events: &[EventPayload]);

    /// Previously saved events, oldest first, or an empty list.
    fn load(&self) -> Vec<EventPayload>;
}

/// Asynchronous store whose contents can only be read with an await.
///
/// A queue built over one of these restores once at startup and cannot
/// return real data from a synchronous `load`.
#[async_trait]
pub trait AsyncEventStore: Send + Sync {
    /// Overwrite the snapshot with exactly `events`. An empty list clears it.
    async fn save(&self, events: Vec<EventPayload>);

    /// Previously saved events, oldest first, or an empty list.
    async fn load(&self) -> Vec<EventPayload>;
}
