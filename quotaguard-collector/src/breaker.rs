use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quotaguard_core::{Clock, QuotaGuardError};

/// Three-state gate shielding the active collector from a failing batch of
/// provider fetches.
///
/// Generalized from the teacher's `BlacklistConnector`'s `Mutex<Option<Instant>>`
/// two-state (blacklisted/not) pattern into the spec's three explicit states.
#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: DateTime<Utc> },
    HalfOpen,
}

/// Per-collector circuit breaker.
///
/// `failure_threshold` consecutive failures trip `Closed -> Open`. Once
/// `timeout` elapses, the next `allow()` call transitions `Open -> HalfOpen`
/// and returns `true` exactly once (the probe); subsequent calls while still
/// `HalfOpen` return `false` until the probe's outcome is recorded.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Builds a breaker starting in `Closed` with zero recorded failures.
    #[must_use]
    pub fn new(failure_threshold: u32, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
            failure_threshold,
            timeout,
            clock,
        }
    }

    /// Returns `true` if a call may proceed right now, transitioning
    /// `Open -> HalfOpen` (admitting exactly one probe) if `timeout` has
    /// elapsed.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { since } => {
                let elapsed = self.clock.now() - since;
                let timeout = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::zero());
                if elapsed >= timeout {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    /// Time remaining until `allow()` would admit a probe, or `None` if a
    /// call is allowed right now.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        let state = self.state.lock().expect("breaker mutex poisoned");
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => None,
            BreakerState::Open { since } => {
                let elapsed = self.clock.now() - since;
                let timeout = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::zero());
                let remaining = (timeout - elapsed).to_std().unwrap_or(Duration::ZERO);
                Some(remaining)
            }
        }
    }

    /// Builds the caller-visible error for a skipped poll cycle.
    #[must_use]
    pub fn breaker_open_error(&self) -> QuotaGuardError {
        QuotaGuardError::breaker_open(self.retry_after().unwrap_or(Duration::ZERO))
    }

    /// Records a successful call: resets the failure counter and closes the
    /// breaker from any state, including resolving a `HalfOpen` probe.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    /// Records a failed call. A failed `HalfOpen` probe reopens the breaker
    /// immediately; a `Closed` failure increments the counter and trips to
    /// `Open` once `failure_threshold` is reached.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        *state = match *state {
            BreakerState::Closed { consecutive_failures } => {
                let count = consecutive_failures + 1;
                if count >= self.failure_threshold {
                    BreakerState::Open { since: self.clock.now() }
                } else {
                    BreakerState::Closed { consecutive_failures: count }
                }
            }
            BreakerState::HalfOpen | BreakerState::Open { .. } => {
                BreakerState::Open { since: self.clock.now() }
            }
        };
    }

    /// True while the breaker is in the `Open` state (for diagnostics/tests).
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock().expect("breaker mutex poisoned"), BreakerState::Open { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaguard_core::SystemClock;

    fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(threshold, timeout, Arc::new(SystemClock))
    }

    #[test]
    fn closed_breaker_allows_calls() {
        let b = breaker(3, Duration::from_millis(100));
        assert!(b.allow());
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let b = breaker(3, Duration::from_secs(60));
        b.record_failure();
        b.record_failure();
        assert!(b.allow());
        b.record_failure();
        assert!(!b.allow());
        assert!(b.is_open());
    }

    #[test]
    fn any_success_resets_the_counter() {
        let b = breaker(3, Duration::from_secs(60));
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert!(b.allow());
    }

    #[tokio::test]
    async fn half_open_probe_admits_exactly_once() {
        let b = breaker(1, Duration::from_millis(20));
        b.record_failure();
        assert!(!b.allow());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(b.allow());
        assert!(!b.allow());
    }

    #[tokio::test]
    async fn failed_probe_reopens_the_breaker() {
        let b = breaker(1, Duration::from_millis(20));
        b.record_failure();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(b.allow());
        b.record_failure();
        assert!(!b.allow());
        assert!(b.is_open());
    }

    #[tokio::test]
    async fn successful_probe_closes_the_breaker() {
        let b = breaker(1, Duration::from_millis(20));
        b.record_failure();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(b.allow());
        b.record_success();
        assert!(b.allow());
    }
}
