//! In-memory store.

use crate::EventStore;
use beacon_core::EventPayload;
use parking_lot::Mutex;

/// Process-local snapshot; survives queue instances but not the process.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<EventPayload>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `events`.
    pub fn with_events(events: Vec<EventPayload>) -> Self {
        Self {
            events: Mutex::new(events),
            saves: Mutex::new(0),
        }
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> Vec<EventPayload> {
        self.events.lock().clone()
    }

    /// Number of `save` calls received.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl EventStore for MemoryStore {
    fn save(&self, events: &[EventPayload]) {
        *self.events.lock() = events.to_vec();
        *self.saves.lock() += 1;
    }

    fn load(&self) -> Vec<EventPayload> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_overwrites_and_counts() {
        let store = MemoryStore::new();
        let a = EventPayload::builder("a", "u").build();
        let b = EventPayload::builder("b", "u").build();

        store.save(&[a.clone(), b]);
        store.save(&[a.clone()]);

        assert_eq!(store.load(), vec![a]);
        assert_eq!(store.save_count(), 2);

        store.save(&[]);
        assert!(store.load().is_empty());
    }
}
