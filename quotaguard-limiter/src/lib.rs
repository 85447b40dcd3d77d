//! quotaguard-limiter
//!
//! Per-account concurrency admission control: non-blocking `Acquire`/`Release`
//! plus a bounded-wait `Waiter`, matching the teacher's lock-scoped-counter
//! idiom (`QuotaAwareConnector::runtime`) but lock-free on the hot path.
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quotaguard_core::{Clock, SystemClock};
use quotaguard_types::{AccountId, LimiterConfig};
use tokio::sync::RwLock;

/// Per-account concurrency token counter.
///
/// `Acquire`/`Release` never block; an unknown account or a non-positive
/// limit is treated as unlimited. Counters are `AtomicUsize` guarded by a
/// `compare_exchange` loop rather than a mutex, so concurrent `Acquire`
/// calls for the same account never serialise on each other.
pub struct Limiter {
    counters: RwLock<HashMap<AccountId, Arc<AtomicUsize>>>,
    limits: RwLock<HashMap<AccountId, i64>>,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}

impl Limiter {
    /// Builds a limiter with no accounts registered yet and the system clock.
    #[must_use]
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Builds a limiter with an injected `Clock`, for deterministic `Waiter` tests.
    #[must_use]
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            limits: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Sets (or updates) `account_id`'s concurrency ceiling.
    ///
    /// In-flight acquisitions are unaffected; only subsequent `Acquire`
    /// calls observe the new ceiling.
    pub async fn update_limit(&self, account_id: &AccountId, new_limit: i64) {
        self.limits.write().await.insert(account_id.clone(), new_limit);
    }

    async fn limit_for(&self, account_id: &AccountId) -> i64 {
        self.limits.read().await.get(account_id).copied().unwrap_or(0)
    }

    async fn counter_for(&self, account_id: &AccountId) -> Arc<AtomicUsize> {
        if let Some(counter) = self.counters.read().await.get(account_id) {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write().await;
        Arc::clone(
            counters
                .entry(account_id.clone())
                .or_insert_with(|| Arc::new(AtomicUsize::new(0))),
        )
    }

    /// Attempts to take one concurrency slot for `account_id`.
    ///
    /// Never blocks. Returns `true` immediately if the account has no
    /// configured limit (`<= 0` or unregistered); otherwise performs a
    /// CAS loop that only succeeds while `current < limit`.
    pub async fn acquire(&self, account_id: &AccountId) -> bool {
        let limit = self.limit_for(account_id).await;
        if limit <= 0 {
            return true;
        }
        let limit = limit as usize;
        let counter = self.counter_for(account_id).await;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases one concurrency slot for `account_id`, if one is held.
    ///
    /// Never underflows below zero; releasing an account with no counter
    /// registered (never acquired, or unknown) is a no-op.
    pub async fn release(&self, account_id: &AccountId) {
        let counter = {
            let counters = self.counters.read().await;
            counters.get(account_id).cloned()
        };
        if let Some(counter) = counter {
            let mut current = counter.load(Ordering::Acquire);
            while current > 0 {
                match counter.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        }
    }

    /// Current in-flight count for `account_id`, for diagnostics/tests.
    pub async fn current(&self, account_id: &AccountId) -> usize {
        match self.counters.read().await.get(account_id) {
            Some(counter) => counter.load(Ordering::Acquire),
            None => 0,
        }
    }

    /// Builds a bounded-wait [`Waiter`] for `account_id`.
    #[must_use]
    pub fn waiter(&self, account_id: AccountId, timeout: Duration) -> Waiter<'_> {
        Waiter {
            limiter: self,
            account_id,
            timeout,
        }
    }
}

/// Outcome of a [`Waiter::acquire`] call that did not obtain a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The configured timeout elapsed before a slot became available.
    Timeout,
    /// The caller's cancellation signal fired before a slot became available.
    Cancelled,
}

/// Busy-polls `Acquire` for one account with a bounded deadline.
pub struct Waiter<'a> {
    limiter: &'a Limiter,
    account_id: AccountId,
    timeout: Duration,
}

impl Waiter<'_> {
    /// Polls `Acquire` at the limiter's configured interval until a slot is
    /// obtained, the deadline elapses (`WaitError::Timeout`), or
    /// `cancellation` fires (`WaitError::Cancelled`).
    pub async fn acquire(&self, cancellation: &tokio_util::sync::CancellationToken) -> Result<(), WaitError> {
        let deadline = self.limiter.clock.now()
            + chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::zero());
        loop {
            if self.limiter.acquire(&self.account_id).await {
                return Ok(());
            }
            if self.limiter.clock.now() >= deadline {
                return Err(WaitError::Timeout);
            }
            tokio::select! {
                () = cancellation.cancelled() => return Err(WaitError::Cancelled),
                () = self.limiter.clock.sleep(self.limiter.config.waiter_poll_interval) => {}
            }
        }
    }
}
