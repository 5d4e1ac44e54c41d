//! Exponential backoff after failed deliveries.

use std::time::Duration;
use tokio::time::Instant;

/// Computes the backoff window for a given number of consecutive failures.
///
/// `delay = base * 2^(failures - 1)`, capped at `max`. Zero failures means no
/// window at all.
///
/// | Failures | Delay (base=1s, max=60s) |
/// |----------|--------------------------|
/// | 0        | 0s                       |
/// | 1        | 1s                       |
/// | 2        | 2s                       |
/// | 3        | 4s                       |
/// | 7        | 60s (capped)             |
pub fn compute_backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let multiplier = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    Duration::from_millis(delay_ms)
}

/// Failure counter plus a "do not attempt before" deadline.
///
/// The window is never driven by a timer; callers check [`Backoff::is_active`]
/// when they are about to attempt a send.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
    not_before: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
            not_before: None,
        }
    }

    /// Record one more failure and open a new window starting at `now`.
    ///
    /// Returns the length of the new window.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = compute_backoff(self.failures, self.base, self.max);
        self.not_before = Some(now + delay);
        delay
    }

    /// Clear the failure counter and any open window.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.not_before = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.not_before.is_some_and(|deadline| now < deadline)
    }

    /// Time left in the current window, if any.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.not_before
            .filter(|deadline| now < *deadline)
            .map(|deadline| deadline - now)
    }
}
