use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use quotaguard_core::{Clock, QuotaFetcher, QuotaGuardError, SharedStore, SystemClock};
use quotaguard_types::{AccountId, ActiveCollectorConfig, Provider};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::breaker::CircuitBreaker;

/// Source of jitter applied before each fetch starts, abstracted so tests
/// can inject a deterministic (zero) source instead of `rand`.
pub trait JitterSource: Send + Sync {
    /// Returns a jitter duration in `[0, max]`.
    fn next_jitter(&self, max: Duration) -> Duration;
}

/// Jitter source backed by `rand`, the teacher's existing dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn next_jitter(&self, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        let span_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = rand::random::<u64>() % (span_ms + 1);
        Duration::from_millis(jitter_ms)
    }
}

/// A jitter source that always returns zero, for deterministic tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn next_jitter(&self, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

/// Outcome of one account's fetch attempt sequence within a poll cycle.
enum FetchOutcome {
    Success,
    Failure,
    RateLimited,
}

/// Computes the adaptive polling interval multiplier from the fleet's mean
/// `effectiveRemainingPct`, clamped to `[5s, 5min]`.
///
/// A pure function, unit-testable without a running collector, matching the
/// teacher's `provider_sort_key`/`exchange_sort_key` style.
#[must_use]
pub fn next_interval(mean_remaining_pct: f64, base: Duration) -> Duration {
    let multiplier = if mean_remaining_pct < 20.0 {
        0.25
    } else if mean_remaining_pct < 50.0 {
        0.5
    } else if mean_remaining_pct < 80.0 {
        1.0
    } else {
        2.0
    };
    let scaled = base.mul_f64(multiplier);
    scaled.clamp(Duration::from_secs(5), Duration::from_secs(5 * 60))
}

/// Periodic polling over enabled accounts with an adaptive interval and a
/// per-collector circuit breaker.
pub struct ActiveCollector {
    fetchers: HashMap<Provider, Arc<dyn QuotaFetcher>>,
    breaker: CircuitBreaker,
    config: std::sync::RwLock<ActiveCollectorConfig>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
}

impl ActiveCollector {
    /// Builds an active collector with the system clock and `rand`-backed jitter.
    #[must_use]
    pub fn new(config: ActiveCollectorConfig, fetchers: HashMap<Provider, Arc<dyn QuotaFetcher>>) -> Self {
        Self::with_clock_and_jitter(config, fetchers, Arc::new(SystemClock), Arc::new(RandomJitter))
    }

    /// Builds an active collector with injected clock and jitter sources,
    /// for deterministic tests.
    #[must_use]
    pub fn with_clock_and_jitter(
        config: ActiveCollectorConfig,
        fetchers: HashMap<Provider, Arc<dyn QuotaFetcher>>,
        clock: Arc<dyn Clock>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            config.breaker_failure_threshold,
            config.breaker_timeout,
            Arc::clone(&clock),
        );
        Self {
            fetchers,
            breaker,
            config: std::sync::RwLock::new(config),
            clock,
            jitter,
        }
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config_snapshot(&self) -> ActiveCollectorConfig {
        self.config.read().expect("active collector config rwlock poisoned").clone()
    }

    /// Replaces the hot-reloadable configuration after validating that the
    /// poll interval, fetch timeout, and parallelism bound are all usable;
    /// rejects and keeps the prior config otherwise.
    pub fn update_config(&self, new_config: ActiveCollectorConfig) -> Result<(), QuotaGuardError> {
        if new_config.base_interval.is_zero() {
            return Err(QuotaGuardError::ConfigInvalid("base_interval must be positive".to_owned()));
        }
        if new_config.fetch_timeout.is_zero() {
            return Err(QuotaGuardError::ConfigInvalid("fetch_timeout must be positive".to_owned()));
        }
        if new_config.max_parallel_fetches == 0 {
            return Err(QuotaGuardError::ConfigInvalid("max_parallel_fetches must be at least 1".to_owned()));
        }
        *self.config.write().expect("active collector config rwlock poisoned") = new_config;
        Ok(())
    }

    /// Current mean `effectiveRemainingWithVirtual` across every known
    /// quota snapshot for `accounts`, used to drive [`next_interval`].
    pub async fn mean_remaining_pct(&self, store: &dyn quotaguard_core::Store, accounts: &[AccountId]) -> Option<f64> {
        let mut total = 0.0;
        let mut count = 0usize;
        for account_id in accounts {
            if let Some(quota) = quotaguard_core::Quotas::get(store, account_id).await {
                total += quota.effective_remaining_with_virtual();
                count += 1;
            }
        }
        (count > 0).then(|| total / count as f64)
    }

    async fn fetch_one(
        &self,
        store: &dyn quotaguard_core::Store,
        account_id: &AccountId,
        provider: &Provider,
    ) -> FetchOutcome {
        let Some(fetcher) = self.fetchers.get(provider) else {
            return FetchOutcome::Failure;
        };
        let Some(credentials) = quotaguard_core::Credentials::get(store, account_id).await else {
            return FetchOutcome::Failure;
        };

        let config = self.config_snapshot();
        let total_attempts = config.retry_attempts + 1;
        let mut last_rate_limited = false;
        for attempt in 0..total_attempts {
            if attempt > 0 {
                let backoff = config.retry_backoff * attempt;
                self.clock.sleep(backoff).await;
            }
            let fetch_future = fetcher.fetch_quota(account_id, &credentials);
            match tokio::time::timeout(config.fetch_timeout, fetch_future).await {
                Ok(Ok(quota)) => {
                    quotaguard_core::Quotas::set(store, quota).await;
                    return FetchOutcome::Success;
                }
                Ok(Err(QuotaGuardError::RateLimited { retry_after })) => {
                    let until = self.clock.now()
                        + chrono::Duration::from_std(retry_after).unwrap_or(chrono::Duration::zero());
                    quotaguard_core::Accounts::set_blocked_until(store, account_id, Some(until)).await;
                    last_rate_limited = true;
                    break;
                }
                Ok(Err(_)) | Err(_) => {
                    last_rate_limited = false;
                }
            }
        }
        if last_rate_limited {
            FetchOutcome::RateLimited
        } else {
            FetchOutcome::Failure
        }
    }

    /// Runs one polling step: skips entirely if the breaker denies the
    /// cycle, otherwise fetches every enabled account with bounded
    /// parallelism and updates the breaker from the batch outcome.
    pub async fn poll_once(&self, store: &dyn quotaguard_core::Store) -> Result<(), QuotaGuardError> {
        if !self.breaker.allow() {
            return Err(self.breaker.breaker_open_error());
        }

        let config = self.config_snapshot();
        let accounts = quotaguard_core::Accounts::list_enabled(store).await;
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_fetches.max(1)));
        let mut tasks = FuturesUnordered::new();

        for account in accounts {
            let semaphore = Arc::clone(&semaphore);
            let jitter = self.jitter.next_jitter(config.jitter);
            tasks.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if !jitter.is_zero() {
                    self.clock.sleep(jitter).await;
                }
                self.fetch_one(store, &account.id, &account.provider).await
            });
        }

        let mut attempted = false;
        let mut any_success = false;
        let mut any_hard_failure = false;
        while let Some(outcome) = tasks.next().await {
            attempted = true;
            match outcome {
                FetchOutcome::Success => any_success = true,
                FetchOutcome::Failure => any_hard_failure = true,
                FetchOutcome::RateLimited => {}
            }
        }

        if attempted {
            if any_success {
                self.breaker.record_success();
            } else if any_hard_failure {
                self.breaker.record_failure();
            }
        }
        Ok(())
    }
}

/// Handle to the active collector's polling loop task.
#[derive(Debug)]
pub struct PollerHandle {
    inner: Option<tokio::task::JoinHandle<()>>,
    token: CancellationToken,
}

impl PollerHandle {
    /// Requests cooperative shutdown and awaits the polling task's completion.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            let _ = inner.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            inner.abort();
        }
    }
}

/// Spawns the active collector's poll loop, recomputing the adaptive
/// interval after each cycle when enabled.
pub fn spawn_polling_loop(collector: Arc<ActiveCollector>, store: SharedStore) -> PollerHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();
    let handle = tokio::spawn(async move {
        let mut interval = collector.config_snapshot().base_interval;
        loop {
            tokio::select! {
                () = task_token.cancelled() => break,
                () = collector.clock.sleep(interval) => {
                    let _ = collector.poll_once(&*store).await;
                    let config = collector.config_snapshot();
                    interval = config.base_interval;
                    if config.adaptive_interval_enabled {
                        let accounts: Vec<AccountId> = quotaguard_core::Accounts::list_enabled(&*store)
                            .await
                            .into_iter()
                            .map(|a| a.id)
                            .collect();
                        if let Some(mean) = collector.mean_remaining_pct(&*store, &accounts).await {
                            interval = next_interval(mean, config.base_interval);
                        }
                    }
                }
            }
        }
    });
    PollerHandle { inner: Some(handle), token }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_interval_scales_by_remaining_quota() {
        let base = Duration::from_secs(60);
        assert_eq!(next_interval(10.0, base), Duration::from_secs(15));
        assert_eq!(next_interval(60.0, base), Duration::from_secs(60));
        assert_eq!(next_interval(90.0, base), Duration::from_secs(120));
    }

    #[test]
    fn adaptive_interval_clamps_to_bounds() {
        let base = Duration::from_secs(10);
        assert_eq!(next_interval(5.0, base), Duration::from_secs(5));
        let base = Duration::from_secs(300);
        assert_eq!(next_interval(90.0, base), Duration::from_secs(300));
    }
}
