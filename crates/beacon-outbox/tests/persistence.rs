//! Queue contents survive a restart through each durable store.

use async_trait::async_trait;
use beacon_core::{EventPayload, QueueConfig};
use beacon_outbox::{DeliveryQueue, FlushOutcome, SendOptions, Transport, TransportError};
use beacon_store::{AsyncEventStore, AsyncSqliteStore, JsonFileStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Transport that is always offline.
struct Offline;

#[async_trait]
impl Transport for Offline {
    async fn send(&self, _batch: &[EventPayload], _options: SendOptions) -> Result<bool, TransportError> {
        Err(TransportError::Retryable("offline".to_string()))
    }

    fn send_unload(&self, _batch: Vec<EventPayload>) {}
}

fn config() -> QueueConfig {
    QueueConfig {
        flush_size: 100,
        max_queue_size: 100,
        send_timeout: Duration::from_secs(1),
        ..QueueConfig::default()
    }
}

fn events(n: usize) -> Vec<EventPayload> {
    (0..n)
        .map(|i| EventPayload::builder(format!("event-{i}"), "user-1").build())
        .collect()
}

fn ids(events: &[EventPayload]) -> Vec<String> {
    events.iter().map(|e| e.event_id().to_string()).collect()
}

#[tokio::test]
async fn sqlite_store_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.sqlite");
    let sent = events(7);

    {
        let store = Arc::new(SqliteStore::open(&path, "beacon_queue").unwrap());
        let queue = DeliveryQueue::new(config(), Arc::new(Offline), store);
        for event in sent.clone() {
            queue.enqueue(event);
        }
        assert_eq!(queue.size(), 7);
    }

    let store = Arc::new(SqliteStore::open(&path, "beacon_queue").unwrap());
    let queue = DeliveryQueue::new(config(), Arc::new(Offline), store);

    assert_eq!(queue.size(), 7);
    assert_eq!(ids(&queue.pending()), ids(&sent));
}

#[tokio::test]
async fn failed_batch_is_persisted_again() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.sqlite");
    let sent = events(3);

    {
        let store = Arc::new(SqliteStore::open(&path, "q").unwrap());
        let queue = DeliveryQueue::new(config(), Arc::new(Offline), store);
        for event in sent.clone() {
            queue.enqueue(event);
        }
        assert_eq!(queue.flush().await, FlushOutcome::Requeued(3));
    }

    let store = Arc::new(SqliteStore::open(&path, "q").unwrap());
    let queue = DeliveryQueue::new(config(), Arc::new(Offline), store);
    assert_eq!(ids(&queue.pending()), ids(&sent));
}

#[tokio::test]
async fn json_file_store_round_trip() {
    let dir = tempdir().unwrap();
    let sent = events(4);

    {
        let store = Arc::new(JsonFileStore::new(dir.path(), "beacon_queue"));
        let queue = DeliveryQueue::new(config(), Arc::new(Offline), store);
        for event in sent.clone() {
            queue.enqueue(event);
        }
    }

    let store = Arc::new(JsonFileStore::new(dir.path(), "beacon_queue"));
    let queue = DeliveryQueue::new(config(), Arc::new(Offline), store);
    assert_eq!(ids(&queue.pending()), ids(&sent));
}

#[tokio::test]
async fn async_sqlite_store_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.sqlite");
    let sent = events(5);

    {
        let store = Arc::new(AsyncSqliteStore::open(&path, "beacon_queue").await.unwrap());
        let queue = DeliveryQueue::with_async_store(config(), Arc::new(Offline), store.clone());
        queue.ready().await;
        for event in sent.clone() {
            queue.enqueue(event);
        }
        drop(queue);

        // Snapshot writes are asynchronous; wait for the last one to land.
        for _ in 0..100 {
            if store.load().await.len() == sent.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    let store = Arc::new(AsyncSqliteStore::open(&path, "beacon_queue").await.unwrap());
    let queue = DeliveryQueue::with_async_store(config(), Arc::new(Offline), store);
    queue.ready().await;

    assert_eq!(queue.size(), 5);
    assert_eq!(ids(&queue.pending()), ids(&sent));
}
