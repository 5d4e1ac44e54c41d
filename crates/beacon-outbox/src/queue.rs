//! Delivery queue: buffering, batching, retry and teardown-safe flushing.
//!
//! Events move through exactly one of: pending, in-flight, delivered, dropped.
//! The persisted snapshot mirrors the pending list only.

use crate::{Backoff, SendOptions, Transport, TransportError};
use beacon_core::{EventPayload, QueueConfig};
use beacon_store::{AsyncEventStore, EventStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Why a flush call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyFlushing,
    Empty,
    BackingOff,
    Restoring,
}

/// Result of a single flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Skipped(SkipReason),
    /// The batch was accepted.
    Delivered(usize),
    /// The batch went back to the front of the queue and backoff grew.
    Requeued(usize),
    /// The batch was rejected and discarded.
    Dropped(usize),
    /// The account quota is used up; everything queued was discarded and
    /// automatic delivery stopped.
    QuotaExhausted { discarded: usize },
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub consecutive_failures: u32,
    pub backing_off: bool,
    pub halted: bool,
    pub ready: bool,
}

/// Send results folded into one exhaustively matched verdict.
#[derive(Debug)]
enum SendVerdict {
    Delivered,
    SoftRejected,
    Retryable(String),
    TimedOut,
    QuotaExhausted,
    NonRetryable { status: u16, body: String },
}

impl SendVerdict {
    fn from_send(result: Result<Result<bool, TransportError>, tokio::time::error::Elapsed>) -> Self {
        match result {
            Ok(Ok(true)) => SendVerdict::Delivered,
            Ok(Ok(false)) => SendVerdict::SoftRejected,
            Ok(Err(TransportError::Retryable(reason))) => SendVerdict::Retryable(reason),
            Ok(Err(TransportError::QuotaExhausted)) => SendVerdict::QuotaExhausted,
            Ok(Err(TransportError::NonRetryable { status, body })) => {
                SendVerdict::NonRetryable { status, body }
            }
            Err(_) => SendVerdict::TimedOut,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    events: Vec<EventPayload>,
}

struct QueueState {
    pending: VecDeque<EventPayload>,
    in_flight: Option<InFlight>,
    flushing: bool,
    backoff: Backoff,
    halted: bool,
    ready: bool,
    generation: u64,
}

enum Persistence {
    Sync(Arc<dyn EventStore>),
    Async(watch::Sender<Vec<EventPayload>>),
    Disabled,
}

struct Inner {
    config: QueueConfig,
    transport: Arc<dyn Transport>,
    persistence: Persistence,
    state: Mutex<QueueState>,
    ready_tx: watch::Sender<bool>,
    flush_done: Notify,
    timer: Mutex<Option<JoinHandle<()>>>,
    runtime: Option<Handle>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

/// Bounded FIFO of events awaiting delivery.
///
/// Cloning yields another handle to the same queue. At most one flush runs at
/// a time; `enqueue` never blocks on delivery.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<Inner>,
}

impl DeliveryQueue {
    /// Create a queue over a synchronous store, restoring its snapshot now.
    ///
    /// Every change to the pending list is saved before the call returns,
    /// under the state lock.
    pub fn new(config: QueueConfig, transport: Arc<dyn Transport>, store: Arc<dyn EventStore>) -> Self {
        let restored = store.load();
        let queue = Self::build(config, transport, Persistence::Sync(store), true);

        if !restored.is_empty() {
            let mut state = queue.inner.state.lock();
            state.pending.extend(restored);
            queue.evict_overflow(&mut state);
            info!(count = state.pending.len(), "Restored queued events");
        }

        queue
    }

    /// Create a queue over an asynchronous store.
    ///
    /// The queue accepts events immediately but stays in the restore phase
    /// until the stored snapshot has been loaded and merged in front of them;
    /// no flush sends anything before that. Requires a Tokio runtime; without
    /// one the queue runs in memory only.
    pub fn with_async_store(
        config: QueueConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn AsyncEventStore>,
    ) -> Self {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime, queue will not be persisted");
            return Self::build(config, transport, Persistence::Disabled, true);
        };

        let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());
        let queue = Self::build(config, transport, Persistence::Async(snapshot_tx), false);

        runtime.spawn(write_snapshots(store.clone(), snapshot_rx));

        let weak = Arc::downgrade(&queue.inner);
        runtime.spawn(async move {
            let restored = store.load().await;
            if let Some(inner) = weak.upgrade() {
                DeliveryQueue { inner }.finish_restore(restored);
            }
        });

        queue
    }

    fn build(
        config: QueueConfig,
        transport: Arc<dyn Transport>,
        persistence: Persistence,
        ready: bool,
    ) -> Self {
        let (ready_tx, _) = watch::channel(ready);
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                persistence,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    in_flight: None,
                    flushing: false,
                    backoff,
                    halted: false,
                    ready,
                    generation: 0,
                }),
                ready_tx,
                flush_done: Notify::new(),
                timer: Mutex::new(None),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    fn finish_restore(&self, restored: Vec<EventPayload>) {
        let restored_count = restored.len();
        {
            let mut state = self.inner.state.lock();
            let enqueued = std::mem::take(&mut state.pending);
            state.pending = restored.into();
            state.pending.extend(enqueued);
            self.evict_overflow(&mut state);
            state.ready = true;
            self.persist(&mut state);
            info!(
                restored = restored_count,
                pending = state.pending.len(),
                "Queue restore complete"
            );
        }
        self.inner.ready_tx.send_replace(true);
    }

    /// Wait until the restore phase is over.
    pub async fn ready(&self) {
        let mut rx = self.inner.ready_tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Accept an event. Never blocks and never fails.
    ///
    /// Evicts the oldest pending event when the queue is full, persists the
    /// new snapshot and kicks off a background flush once a full batch is
    /// waiting.
    pub fn enqueue(&self, event: EventPayload) {
        let should_flush = {
            let mut state = self.inner.state.lock();
            debug!(event = event.event(), event_id = event.event_id(), "Enqueued event");
            state.pending.push_back(event);
            self.evict_overflow(&mut state);
            self.persist(&mut state);

            state.ready && !state.halted && state.pending.len() >= self.inner.config.flush_size
        };

        if should_flush {
            self.spawn_flush();
        }
    }

    fn spawn_flush(&self) {
        let Some(runtime) = &self.inner.runtime else {
            debug!("No async runtime, leaving batch for the flush timer");
            return;
        };
        let queue = self.clone();
        runtime.spawn(async move {
            queue.flush().await;
        });
    }

    /// Arm the periodic flush timer. Idempotent.
    pub fn start(&self) {
        if self.inner.state.lock().halted {
            debug!("Delivery halted, flush timer not started");
            return;
        }

        let period = self.inner.config.flush_interval;
        if period.is_zero() {
            warn!("Flush interval is zero, flush timer not started");
            return;
        }

        let mut timer = self.inner.timer.lock();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let Some(runtime) = &self.inner.runtime else {
            warn!("No async runtime, flush timer not started");
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        *timer = Some(runtime.spawn(run_timer(weak, period)));
        debug!(interval_ms = period.as_millis() as u64, "Flush timer started");
    }

    /// Disarm the periodic flush timer. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
            debug!("Flush timer stopped");
        }
    }

    /// Attempt to deliver one batch.
    pub async fn flush(&self) -> FlushOutcome {
        let (generation, batch) = {
            let mut state = self.inner.state.lock();
            if !state.ready {
                return FlushOutcome::Skipped(SkipReason::Restoring);
            }
            if state.flushing {
                return FlushOutcome::Skipped(SkipReason::AlreadyFlushing);
            }
            if state.pending.is_empty() {
                return FlushOutcome::Skipped(SkipReason::Empty);
            }
            if let Some(remaining) = state.backoff.remaining(Instant::now()) {
                debug!(remaining_ms = remaining.as_millis() as u64, "Inside backoff window, skipping flush");
                return FlushOutcome::Skipped(SkipReason::BackingOff);
            }

            let size = state.pending.len().min(self.inner.config.flush_size);
            let batch: Vec<EventPayload> = state.pending.drain(..size).collect();
            state.generation += 1;
            let generation = state.generation;
            state.in_flight = Some(InFlight {
                generation,
                events: batch.clone(),
            });
            state.flushing = true;
            self.persist(&mut state);
            (generation, batch)
        };

        let mut guard = FlushGuard {
            queue: self,
            generation,
            settled: false,
        };

        let options = SendOptions {
            compression: self.inner.config.compression,
        };
        let result = tokio::time::timeout(
            self.inner.config.send_timeout,
            self.inner.transport.send(&batch, options),
        )
        .await;

        guard.settled = true;
        self.complete(generation, SendVerdict::from_send(result))
    }

    fn complete(&self, generation: u64, verdict: SendVerdict) -> FlushOutcome {
        let mut halt = false;
        let outcome = {
            let mut state = self.inner.state.lock();
            state.flushing = false;

            let batch = match state.in_flight.take() {
                Some(in_flight) if in_flight.generation == generation => in_flight.events,
                other => {
                    state.in_flight = other;
                    debug!(generation, "Batch was taken by an unload flush");
                    Vec::new()
                }
            };
            let count = batch.len();

            let outcome = match verdict {
                SendVerdict::Delivered => {
                    state.backoff.reset();
                    info!(count, "Batch delivered");
                    FlushOutcome::Delivered(count)
                }
                SendVerdict::SoftRejected => self.retry_later(&mut state, batch, "rejected by server"),
                SendVerdict::Retryable(reason) => self.retry_later(&mut state, batch, &reason),
                SendVerdict::TimedOut => self.retry_later(&mut state, batch, "send timed out"),
                SendVerdict::QuotaExhausted => {
                    let discarded = count + state.pending.len();
                    state.pending.clear();
                    state.halted = true;
                    halt = true;
                    error!(discarded, "Event quota exhausted, automatic delivery halted");
                    FlushOutcome::QuotaExhausted { discarded }
                }
                SendVerdict::NonRetryable { status, body } => {
                    warn!(count, status, body = %body, "Batch rejected, dropping");
                    FlushOutcome::Dropped(count)
                }
            };

            self.persist(&mut state);
            outcome
        };

        if halt {
            self.stop();
        }
        self.inner.flush_done.notify_waiters();
        outcome
    }

    fn retry_later(&self, state: &mut QueueState, batch: Vec<EventPayload>, reason: &str) -> FlushOutcome {
        let count = batch.len();
        for event in batch.into_iter().rev() {
            state.pending.push_front(event);
        }
        self.evict_overflow(state);
        let delay = state.backoff.record_failure(Instant::now());
        warn!(
            count,
            failures = state.backoff.failures(),
            backoff_ms = delay.as_millis() as u64,
            reason,
            "Batch send failed, will retry"
        );
        FlushOutcome::Requeued(count)
    }

    /// Put back a batch whose flush was cancelled before it settled.
    fn abandon(&self, generation: u64) {
        {
            let mut state = self.inner.state.lock();
            state.flushing = false;
            match state.in_flight.take() {
                Some(in_flight) if in_flight.generation == generation => {
                    debug!(count = in_flight.events.len(), "Flush cancelled, requeueing batch");
                    for event in in_flight.events.into_iter().rev() {
                        state.pending.push_front(event);
                    }
                    self.evict_overflow(&mut state);
                    self.persist(&mut state);
                }
                other => state.in_flight = other,
            }
        }
        self.inner.flush_done.notify_waiters();
    }

    /// Flush until the queue is empty or a flush makes no progress.
    ///
    /// Waits for the restore phase first, and for any flush already running.
    pub async fn flush_all(&self) {
        self.ready().await;

        loop {
            let finished = self.inner.flush_done.notified();
            match self.flush().await {
                FlushOutcome::Skipped(SkipReason::AlreadyFlushing) => finished.await,
                FlushOutcome::Skipped(_) | FlushOutcome::Requeued(_) => break,
                FlushOutcome::Delivered(_)
                | FlushOutcome::Dropped(_)
                | FlushOutcome::QuotaExhausted { .. } => {
                    if self.inner.state.lock().pending.is_empty() {
                        break;
                    }
                }
            }
        }
    }

    /// Stop the timer and drain for at most `timeout`.
    ///
    /// Returns `true` if draining finished before the deadline. A send cut off
    /// by the deadline puts its batch back in the queue.
    pub async fn shutdown(&self, timeout: std::time::Duration) -> bool {
        self.stop();

        match tokio::time::timeout(timeout, self.flush_all()).await {
            Ok(()) => {
                info!(remaining = self.size(), "Queue shut down");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.size(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Queue shutdown timed out"
                );
                false
            }
        }
    }

    /// Send everything in flight and pending in one fire-and-forget request.
    ///
    /// Safe to call at teardown. A normal flush still in progress is not
    /// cancelled, so its batch may be delivered twice. Returns how many events
    /// were handed to the transport.
    pub fn flush_for_unload(&self) -> usize {
        let batch = {
            let mut state = self.inner.state.lock();
            let mut batch = state
                .in_flight
                .take()
                .map(|in_flight| in_flight.events)
                .unwrap_or_default();
            batch.extend(state.pending.drain(..));
            self.persist(&mut state);
            batch
        };

        if batch.is_empty() {
            debug!("Nothing to flush for unload");
            return 0;
        }

        let count = batch.len();
        info!(count, "Flushing queue for unload");
        self.inner.transport.send_unload(batch);
        count
    }

    /// Pending plus in-flight events.
    pub fn size(&self) -> usize {
        let state = self.inner.state.lock();
        state.pending.len() + state.in_flight.as_ref().map_or(0, |f| f.events.len())
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        QueueStats {
            pending: state.pending.len(),
            in_flight: state.in_flight.as_ref().map_or(0, |f| f.events.len()),
            consecutive_failures: state.backoff.failures(),
            backing_off: state.backoff.is_active(Instant::now()),
            halted: state.halted,
            ready: state.ready,
        }
    }

    /// Copy of the pending events, oldest first.
    pub fn pending(&self) -> Vec<EventPayload> {
        self.inner.state.lock().pending.iter().cloned().collect()
    }

    fn evict_overflow(&self, state: &mut QueueState) {
        let max = self.inner.config.max_queue_size.max(1);
        while state.pending.len() > max {
            if let Some(dropped) = state.pending.pop_front() {
                warn!(
                    event = dropped.event(),
                    event_id = dropped.event_id(),
                    max_queue_size = max,
                    "Queue full, dropping oldest event"
                );
            }
        }
    }

    /// Mirror the pending list to the store. Suppressed while restoring so the
    /// stored snapshot keeps the events that are about to be restored.
    fn persist(&self, state: &mut QueueState) {
        if !state.ready {
            return;
        }
        match &self.inner.persistence {
            Persistence::Sync(store) => store.save(state.pending.make_contiguous()),
            Persistence::Async(tx) => {
                tx.send_replace(state.pending.iter().cloned().collect());
            }
            Persistence::Disabled => {}
        }
    }
}

/// Requeues the in-flight batch if a flush future is dropped mid-send.
struct FlushGuard<'a> {
    queue: &'a DeliveryQueue,
    generation: u64,
    settled: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.abandon(self.generation);
        }
    }
}

async fn run_timer(queue: Weak<Inner>, period: std::time::Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = queue.upgrade() else {
            break;
        };
        let queue = DeliveryQueue { inner };
        if queue.inner.state.lock().halted {
            break;
        }
        queue.flush().await;
    }
}

/// Writes the latest snapshot; intermediate snapshots are skipped.
async fn write_snapshots(store: Arc<dyn AsyncEventStore>, mut rx: watch::Receiver<Vec<EventPayload>>) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        store.save(snapshot).await;
    }
}
