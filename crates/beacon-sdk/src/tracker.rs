//! The tracker handle and its builder.

use crate::context::{build_context, ContextProvider};
use crate::TrackerResult;
use beacon_core::{Config, EventPayload, Properties};
use beacon_outbox::{DeliveryQueue, FlushOutcome, HttpTransport, QueueStats, Transport};
use beacon_store::{AsyncEventStore, EventStore, JsonFileStore, MemoryStore, SqliteStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

enum StoreChoice {
    Memory,
    JsonFile(PathBuf),
    Sqlite(PathBuf),
    Sync(Arc<dyn EventStore>),
    Async(Arc<dyn AsyncEventStore>),
}

/// Builder for [`Tracker`].
pub struct TrackerBuilder {
    config: Config,
    store: StoreChoice,
    transport: Option<Arc<dyn Transport>>,
    providers: Vec<Arc<dyn ContextProvider>>,
    distinct_id: Option<String>,
    autostart: bool,
}

impl TrackerBuilder {
    fn new(api_key: &str) -> Self {
        Self {
            config: Config {
                api_key: api_key.to_string(),
                ..Config::default()
            },
            store: StoreChoice::Memory,
            transport: None,
            providers: Vec::new(),
            distinct_id: None,
            autostart: true,
        }
    }

    /// Use a full configuration. An empty API key in `config` keeps the
    /// builder's key.
    pub fn config(mut self, mut config: Config) -> Self {
        if config.api_key.is_empty() {
            config.api_key = std::mem::take(&mut self.config.api_key);
        }
        self.config = config;
        self
    }

    pub fn host(mut self, api_host: impl Into<String>) -> Self {
        self.config.api_host = api_host.into();
        self
    }

    /// Keep the queue in memory only (the default).
    pub fn memory_store(mut self) -> Self {
        self.store = StoreChoice::Memory;
        self
    }

    /// Persist the queue as `<dir>/<storage_key>.json`.
    pub fn json_file_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store = StoreChoice::JsonFile(dir.into());
        self
    }

    /// Persist the queue in a SQLite database, written synchronously on every
    /// change. Prefer [`TrackerBuilder::async_store`] with an
    /// `AsyncSqliteStore` when the tracker runs on a busy runtime.
    pub fn sqlite_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = StoreChoice::Sqlite(path.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = StoreChoice::Sync(store);
        self
    }

    /// Persist through an asynchronous store; the snapshot is restored in the
    /// background and delivery waits for it.
    pub fn async_store(mut self, store: Arc<dyn AsyncEventStore>) -> Self {
        self.store = StoreChoice::Async(store);
        self
    }

    /// Replace the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Start identified as `distinct_id` instead of an anonymous id.
    pub fn distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    /// Arm the periodic flush timer on build (default `true`).
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn build(self) -> TrackerResult<Tracker> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };

        let queue_config = self.config.queue_config();
        let storage_key = self.config.storage_key.as_str();
        let queue = match self.store {
            StoreChoice::Memory => {
                DeliveryQueue::new(queue_config, transport, Arc::new(MemoryStore::new()))
            }
            StoreChoice::JsonFile(dir) => DeliveryQueue::new(
                queue_config,
                transport,
                Arc::new(JsonFileStore::new(&dir, storage_key)),
            ),
            StoreChoice::Sqlite(path) => DeliveryQueue::new(
                queue_config,
                transport,
                Arc::new(SqliteStore::open(&path, storage_key)?),
            ),
            StoreChoice::Sync(store) => DeliveryQueue::new(queue_config, transport, store),
            StoreChoice::Async(store) => DeliveryQueue::with_async_store(queue_config, transport, store),
        };

        if self.autostart {
            queue.start();
        }

        let anonymous_id = new_id();
        let identity = Identity {
            distinct_id: self.distinct_id.unwrap_or_else(|| anonymous_id.clone()),
            anonymous_id,
            session_id: new_id(),
        };

        info!(
            host = %self.config.api_host,
            distinct_id = %identity.distinct_id,
            "Tracker ready"
        );

        Ok(Tracker {
            queue,
            identity: Mutex::new(identity),
            super_properties: Mutex::new(Properties::new()),
            opted_out: AtomicBool::new(false),
            providers: self.providers,
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone)]
struct Identity {
    distinct_id: String,
    anonymous_id: String,
    session_id: String,
}

/// Handle for capturing events.
///
/// Owned by the host application; separate trackers share no state.
pub struct Tracker {
    queue: DeliveryQueue,
    identity: Mutex<Identity>,
    super_properties: Mutex<Properties>,
    opted_out: AtomicBool,
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl Tracker {
    pub fn builder(api_key: &str) -> TrackerBuilder {
        TrackerBuilder::new(api_key)
    }

    /// Capture an event. Super-properties are merged under `properties`.
    pub fn capture(&self, event: &str, properties: Option<Properties>) {
        let mut merged = self.super_properties.lock().clone();
        if let Some(properties) = properties {
            merged.extend(properties);
        }
        self.emit(event, merged, Properties::new());
    }

    /// Attach all future events to `distinct_id` and emit `$identify`.
    pub fn identify(&self, distinct_id: &str, user_properties: Option<Properties>) {
        if distinct_id.trim().is_empty() {
            warn!("Ignoring identify with empty distinct id");
            return;
        }
        if self.is_opted_out() {
            return;
        }

        let anonymous_id = {
            let mut identity = self.identity.lock();
            identity.distinct_id = distinct_id.to_string();
            identity.anonymous_id.clone()
        };

        let mut properties = self.super_properties.lock().clone();
        properties.insert("$anon_distinct_id".to_string(), Value::String(anonymous_id));
        self.emit("$identify", properties, user_properties.unwrap_or_default());
    }

    /// Emit a `$set` event updating the current user's properties.
    pub fn set_user_properties(&self, user_properties: Properties) {
        if user_properties.is_empty() {
            debug!("Ignoring empty user property update");
            return;
        }
        self.emit("$set", Properties::new(), user_properties);
    }

    /// Register properties sent with every captured event.
    pub fn register(&self, properties: Properties) {
        self.super_properties.lock().extend(properties);
    }

    pub fn unregister(&self, key: &str) {
        self.super_properties.lock().remove(key);
    }

    /// Forget the current user: new anonymous id and session, no
    /// super-properties.
    pub fn reset(&self) {
        let anonymous_id = new_id();
        *self.identity.lock() = Identity {
            distinct_id: anonymous_id.clone(),
            anonymous_id,
            session_id: new_id(),
        };
        self.super_properties.lock().clear();
        debug!("Tracker identity reset");
    }

    pub fn distinct_id(&self) -> String {
        self.identity.lock().distinct_id.clone()
    }

    pub fn anonymous_id(&self) -> String {
        self.identity.lock().anonymous_id.clone()
    }

    pub fn session_id(&self) -> String {
        self.identity.lock().session_id.clone()
    }

    /// Stop capturing; tracking calls are ignored until [`Tracker::opt_in`].
    pub fn opt_out(&self) {
        self.opted_out.store(true, Ordering::SeqCst);
        info!("Tracking opted out");
    }

    pub fn opt_in(&self) {
        self.opted_out.store(false, Ordering::SeqCst);
        info!("Tracking opted in");
    }

    pub fn is_opted_out(&self) -> bool {
        self.opted_out.load(Ordering::SeqCst)
    }

    pub async fn flush(&self) -> FlushOutcome {
        self.queue.flush().await
    }

    /// Stop the flush timer and drain for at most `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.queue.shutdown(timeout).await
    }

    /// Best-effort send of everything queued, for process teardown.
    pub fn flush_for_unload(&self) -> usize {
        self.queue.flush_for_unload()
    }

    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Build one payload and enqueue it.
    fn emit(&self, event: &str, properties: Properties, user_properties: Properties) {
        if self.is_opted_out() {
            return;
        }
        if event.trim().is_empty() {
            warn!("Ignoring event with empty name");
            return;
        }

        let identity = self.identity.lock().clone();
        let context = build_context(&identity.session_id, &self.providers);

        let payload = EventPayload::builder(event, identity.distinct_id)
            .anonymous_id(identity.anonymous_id)
            .properties(properties)
            .user_properties(user_properties)
            .context(context)
            .build();

        self.queue.enqueue(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticContext;
    use async_trait::async_trait;
    use beacon_outbox::{SendOptions, TransportError};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<EventPayload>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, batch: &[EventPayload], _options: SendOptions) -> Result<bool, TransportError> {
            self.sent.lock().extend_from_slice(batch);
            Ok(true)
        }

        fn send_unload(&self, batch: Vec<EventPayload>) {
            self.sent.lock().extend(batch);
        }
    }

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    fn tracker() -> (Tracker, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let tracker = Tracker::builder("phc_test")
            .transport(transport.clone())
            .autostart(false)
            .build()
            .unwrap();
        (tracker, transport)
    }

    #[tokio::test]
    async fn capture_builds_one_payload() {
        let (tracker, transport) = tracker();

        tracker.capture("clicked", Some(props(json!({"button": "save"}))));
        assert_eq!(tracker.queue_size(), 1);
        tracker.flush().await;

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        let event = &sent[0];
        assert_eq!(event.event(), "clicked");
        assert_eq!(event.distinct_id(), tracker.distinct_id());
        assert_eq!(event.anonymous_id(), Some(tracker.anonymous_id().as_str()));
        assert_eq!(event.properties().unwrap()["button"], "save");
        let context = event.context().unwrap();
        assert_eq!(context["session_id"], tracker.session_id().as_str());
        assert_eq!(context["$lib"], crate::LIB_NAME);
    }

    #[tokio::test]
    async fn super_properties_merge_under_event_properties() {
        let (tracker, transport) = tracker();
        tracker.register(props(json!({"plan": "pro", "source": "app"})));

        tracker.capture("a", Some(props(json!({"source": "cli"}))));
        tracker.unregister("plan");
        tracker.capture("b", None);
        tracker.flush().await;

        let sent = transport.sent.lock();
        let first = sent[0].properties().unwrap();
        assert_eq!(first["plan"], "pro");
        assert_eq!(first["source"], "cli");
        let second = sent[1].properties().unwrap();
        assert!(second.get("plan").is_none());
        assert_eq!(second["source"], "app");
    }

    #[tokio::test]
    async fn identify_switches_distinct_id() {
        let (tracker, transport) = tracker();
        let anonymous_id = tracker.anonymous_id();

        tracker.identify("user-42", Some(props(json!({"email": "a@example.com"}))));
        tracker.capture("after", None);
        tracker.flush().await;

        assert_eq!(tracker.distinct_id(), "user-42");
        let sent = transport.sent.lock();
        assert_eq!(sent[0].event(), "$identify");
        assert_eq!(sent[0].distinct_id(), "user-42");
        assert_eq!(sent[0].properties().unwrap()["$anon_distinct_id"], anonymous_id.as_str());
        assert_eq!(sent[0].user_properties().unwrap()["email"], "a@example.com");
        assert_eq!(sent[1].distinct_id(), "user-42");
    }

    #[tokio::test]
    async fn set_user_properties_emits_set_event() {
        let (tracker, transport) = tracker();

        tracker.set_user_properties(props(json!({"theme": "dark"})));
        tracker.set_user_properties(Properties::new());
        tracker.flush().await;

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event(), "$set");
        assert_eq!(sent[0].user_properties().unwrap()["theme"], "dark");
        assert!(sent[0].properties().is_none());
    }

    #[tokio::test]
    async fn reset_forgets_identity() {
        let (tracker, _transport) = tracker();
        tracker.identify("user-42", None);
        tracker.register(props(json!({"plan": "pro"})));
        let session = tracker.session_id();

        tracker.reset();

        assert_ne!(tracker.distinct_id(), "user-42");
        assert_eq!(tracker.distinct_id(), tracker.anonymous_id());
        assert_ne!(tracker.session_id(), session);
        assert!(tracker.super_properties.lock().is_empty());
    }

    #[tokio::test]
    async fn opted_out_tracker_builds_nothing() {
        let (tracker, _transport) = tracker();

        tracker.opt_out();
        tracker.capture("ignored", None);
        tracker.identify("user-1", None);
        assert_eq!(tracker.queue_size(), 0);
        assert_eq!(tracker.distinct_id(), tracker.anonymous_id());

        tracker.opt_in();
        tracker.capture("kept", None);
        assert_eq!(tracker.queue_size(), 1);
    }

    #[tokio::test]
    async fn empty_event_name_is_ignored() {
        let (tracker, _transport) = tracker();
        tracker.capture("", None);
        tracker.capture("   ", None);
        tracker.identify("", None);
        assert_eq!(tracker.queue_size(), 0);
    }

    #[tokio::test]
    async fn context_providers_extend_context() {
        let transport = Arc::new(RecordingTransport::default());
        let tracker = Tracker::builder("phc_test")
            .transport(transport.clone())
            .context_provider(Arc::new(StaticContext::default().with("$app_version", "2.1.0")))
            .distinct_id("user-7")
            .autostart(false)
            .build()
            .unwrap();

        tracker.capture("opened", None);
        tracker.flush_for_unload();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].distinct_id(), "user-7");
        assert_eq!(sent[0].context().unwrap()["$app_version"], "2.1.0");
    }

    #[test]
    fn missing_api_key_fails_to_build() {
        let result = Tracker::builder("").transport(Arc::new(RecordingTransport::default())).build();
        assert!(matches!(result, Err(crate::TrackerError::Config(_))));
    }

    #[test]
    fn config_keeps_builder_key_when_empty() {
        let builder = Tracker::builder("phc_test").config(Config {
            flush_size: 5,
            ..Config::default()
        });
        assert_eq!(builder.config.api_key, "phc_test");
        assert_eq!(builder.config.flush_size, 5);
    }
}
