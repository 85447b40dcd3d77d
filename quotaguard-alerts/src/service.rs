use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use quotaguard_core::{Accounts, Clock, DigestData, Notifier, QuotaGuardError, Quotas, SharedStore, SystemClock};
use quotaguard_core::AlertPayload;
use quotaguard_types::{AlertConfig, DedupKey, Severity};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dedup::Dedup;
use crate::digest::next_fire_time;
use crate::evaluator::evaluate_account;
use crate::mute::MuteGate;
use crate::throttle::TokenBucket;

/// Composes the evaluator, dedup table, throttle bucket, mute gate, and
/// digest scheduler described by the Alert Service pipeline:
/// evaluator → dedup → throttle → mute gate → delivery.
pub struct AlertService {
    store: SharedStore,
    notifier: Arc<dyn Notifier>,
    config: StdRwLock<AlertConfig>,
    dedup: Dedup,
    bucket: StdMutex<TokenBucket>,
    mute: MuteGate,
    pending_tx: mpsc::Sender<AlertPayload>,
    pending_rx: tokio::sync::Mutex<Option<mpsc::Receiver<AlertPayload>>>,
    clock: Arc<dyn Clock>,
    delivered_counts: StdMutex<HashMap<Severity, u64>>,
}

/// How often the pending-queue drainer retries a throttled alert.
const PENDING_DRAIN_INTERVAL: Duration = Duration::from_millis(250);

/// How many accounts the daily digest highlights, ranked by `usedPct`.
const DIGEST_TOP_ACCOUNTS: usize = 5;

impl AlertService {
    /// Builds an alert service over `store`, delivering through `notifier`,
    /// using the system clock.
    #[must_use]
    pub fn new(store: SharedStore, notifier: Arc<dyn Notifier>, config: AlertConfig) -> Arc<Self> {
        Self::with_clock(store, notifier, config, Arc::new(SystemClock))
    }

    /// Builds an alert service with an injected `Clock`, for deterministic
    /// dedup-window and digest-timing tests.
    #[must_use]
    pub fn with_clock(store: SharedStore, notifier: Arc<dyn Notifier>, config: AlertConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let (pending_tx, pending_rx) = mpsc::channel(config.pending_queue_capacity.max(1));
        let bucket = TokenBucket::new(config.rate_per_minute, clock.now());
        let dedup = Dedup::new(config.dedup_window);
        Arc::new(Self {
            store,
            notifier,
            config: StdRwLock::new(config),
            dedup,
            bucket: StdMutex::new(bucket),
            mute: MuteGate::new(),
            pending_tx,
            pending_rx: tokio::sync::Mutex::new(Some(pending_rx)),
            clock,
            delivered_counts: StdMutex::new(HashMap::new()),
        })
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config_snapshot(&self) -> AlertConfig {
        self.config.read().expect("alert config rwlock poisoned").clone()
    }

    /// Replaces the hot-reloadable configuration after validating the
    /// digest time/timezone and the default mute duration; rejects and
    /// keeps the prior config otherwise.
    pub fn update_config(&self, new_config: AlertConfig) -> Result<(), QuotaGuardError> {
        if crate::digest::parse_hhmm(&new_config.digest_time).is_none() {
            return Err(QuotaGuardError::ConfigInvalid(format!(
                "digest_time {:?} is not a valid HH:MM time",
                new_config.digest_time
            )));
        }
        if new_config.digest_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(QuotaGuardError::ConfigInvalid(format!(
                "digest_timezone {:?} is not a recognised IANA timezone",
                new_config.digest_timezone
            )));
        }
        if new_config.mute_default_duration.is_zero() {
            return Err(QuotaGuardError::ConfigInvalid("mute_default_duration must be positive".to_owned()));
        }
        *self.config.write().expect("alert config rwlock poisoned") = new_config;
        Ok(())
    }

    /// Engages the mute gate for `duration` (or the configured default).
    pub fn mute(&self, duration: Option<Duration>, reason: String) {
        let duration = duration.unwrap_or_else(|| self.config_snapshot().mute_default_duration);
        self.mute.mute(duration, reason, self.clock.now());
    }

    /// Remaining mute duration, if currently muted.
    #[must_use]
    pub fn mute_remaining(&self) -> Option<chrono::Duration> {
        self.mute.remaining(self.clock.now())
    }

    fn record_delivery(&self, severity: Severity) {
        *self
            .delivered_counts
            .lock()
            .expect("delivered-counts mutex poisoned")
            .entry(severity)
            .or_insert(0) += 1;
    }

    async fn deliver(&self, payload: &AlertPayload) {
        self.record_delivery(payload.severity);
        let _ = self.notifier.send_alert(payload).await;
    }

    /// Runs one alert through dedup, mute, and throttle, delivering
    /// immediately or enqueueing it for the pending-queue drainer.
    pub async fn process_alert(&self, payload: AlertPayload) -> Result<(), QuotaGuardError> {
        let now = self.clock.now();
        if self.mute.is_active(now) {
            return Ok(());
        }

        let key = DedupKey::new(payload.account_id.clone(), &payload.alert_type, payload.severity);
        if !self.dedup.observe(key, now) {
            return Ok(());
        }

        let acquired = self.bucket.lock().expect("token bucket mutex poisoned").try_acquire(now);
        match acquired {
            Ok(()) => {
                self.deliver(&payload).await;
                Ok(())
            }
            Err(_) => self
                .pending_tx
                .try_send(payload)
                .map_err(|err| match err {
                    mpsc::error::TrySendError::Full(_) => QuotaGuardError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => {
                        QuotaGuardError::Other("alert pending queue closed".to_owned())
                    }
                }),
        }
    }

    async fn run_evaluation_cycle(&self) {
        let thresholds = self.config_snapshot().alert_thresholds;
        for account in Accounts::list(&*self.store).await {
            let Some(quota) = Quotas::get(&*self.store, &account.id).await else {
                continue;
            };
            for (alert_type, severity) in evaluate_account(&quota, &thresholds) {
                let payload = AlertPayload {
                    account_id: account.id.clone(),
                    alert_type,
                    severity,
                    used_pct: quota.used_pct(),
                    message: format!("{} crossed {} ({:.1}% used)", account.id, severity, quota.used_pct()),
                };
                let _ = self.process_alert(payload).await;
            }
        }
    }

    async fn drain_pending_once(&self) {
        let mut rx = self.pending_rx.lock().await;
        let Some(rx) = rx.as_mut() else { return };
        loop {
            let now = self.clock.now();
            if self.bucket.lock().expect("token bucket mutex poisoned").try_acquire(now).is_err() {
                break;
            }
            match rx.try_recv() {
                Ok(payload) => self.deliver(&payload).await,
                Err(_) => break,
            }
        }
    }

    async fn build_digest(&self) -> DigestData {
        let mut accounts_by_usage = Vec::new();
        let accounts = Accounts::list(&*self.store).await;
        let total_accounts = accounts.len();
        for account in accounts {
            if let Some(quota) = Quotas::get(&*self.store, &account.id).await {
                accounts_by_usage.push((account.id, quota.used_pct()));
            }
        }
        accounts_by_usage.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        accounts_by_usage.truncate(DIGEST_TOP_ACCOUNTS);

        let counts = std::mem::take(&mut *self.delivered_counts.lock().expect("delivered-counts mutex poisoned"));
        let mut alert_counts_by_severity: Vec<(Severity, u64)> = counts.into_iter().collect();
        alert_counts_by_severity.sort_by_key(|(severity, _)| *severity == Severity::Warning);

        DigestData {
            top_accounts: accounts_by_usage,
            alert_counts_by_severity,
            total_accounts,
        }
    }

    /// Spawns the evaluator, dedup-sweep, digest, and pending-drain tasks.
    pub fn spawn(self: &Arc<Self>) -> AlertsHandle {
        let token = CancellationToken::new();

        let evaluator = Arc::clone(self);
        let evaluator_token = token.clone();
        let evaluator_handle = tokio::spawn(async move {
            loop {
                let interval = evaluator.config_snapshot().evaluation_interval;
                tokio::select! {
                    () = evaluator_token.cancelled() => break,
                    () = evaluator.clock.sleep(interval) => {
                        evaluator.run_evaluation_cycle().await;
                    }
                }
            }
        });

        let sweeper = Arc::clone(self);
        let sweeper_token = token.clone();
        let sweeper_handle = tokio::spawn(async move {
            loop {
                let interval = sweeper.config_snapshot().dedup_sweep_interval;
                tokio::select! {
                    () = sweeper_token.cancelled() => break,
                    () = sweeper.clock.sleep(interval) => {
                        sweeper.dedup.sweep(sweeper.clock.now());
                    }
                }
            }
        });

        let drainer = Arc::clone(self);
        let drainer_token = token.clone();
        let drainer_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = drainer_token.cancelled() => break,
                    () = drainer.clock.sleep(PENDING_DRAIN_INTERVAL) => {
                        drainer.drain_pending_once().await;
                    }
                }
            }
        });

        let digest = Arc::clone(self);
        let digest_token = token.clone();
        let digest_handle = tokio::spawn(async move {
            loop {
                let config = digest.config_snapshot();
                let fire_at = next_fire_time(digest.clock.now(), &config.digest_time, &config.digest_timezone);
                tokio::select! {
                    () = digest_token.cancelled() => break,
                    () = digest.clock.sleep_until(fire_at) => {
                        let payload = digest.build_digest().await;
                        let _ = tokio::time::timeout(config.digest_send_timeout, digest.notifier.send_digest(&payload)).await;
                    }
                }
            }
        });

        AlertsHandle {
            token,
            tasks: vec![evaluator_handle, sweeper_handle, drainer_handle, digest_handle],
            shutdown_timeout: self.config_snapshot().shutdown_timeout,
        }
    }
}

/// Handle to the Alert Service's four background tasks.
pub struct AlertsHandle {
    token: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl AlertsHandle {
    /// Cancels all tasks and waits up to the configured shutdown timeout for
    /// them to finish; tasks still running past the timeout are aborted.
    pub async fn stop(mut self) {
        self.token.cancel();
        let joins = self.tasks.drain(..).map(|handle| async move {
            let _ = handle.await;
        });
        let _ = tokio::time::timeout(self.shutdown_timeout, futures::future::join_all(joins)).await;
    }
}

impl Drop for AlertsHandle {
    fn drop(&mut self) {
        self.token.cancel();
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaguard_mock::{RecordingNotifier, VirtualClock};
    use quotaguard_types::AccountId;

    fn alert_at(account_id: &AccountId, threshold: f64, used_pct: f64) -> AlertPayload {
        AlertPayload {
            account_id: account_id.clone(),
            alert_type: quotaguard_types::AlertType::Threshold { threshold },
            severity: Severity::Warning,
            used_pct,
            message: format!("{account_id} crossed {threshold} ({used_pct:.1}% used)"),
        }
    }

    fn exhausted_alert(account_id: &AccountId) -> AlertPayload {
        AlertPayload {
            account_id: account_id.clone(),
            alert_type: quotaguard_types::AlertType::Exhausted,
            severity: Severity::Critical,
            used_pct: 100.0,
            message: format!("{account_id} exhausted"),
        }
    }

    fn service(clock: Arc<dyn Clock>, config: AlertConfig) -> (Arc<AlertService>, Arc<RecordingNotifier>) {
        let store: SharedStore = Arc::new(quotaguard_store::MemoryStore::new(quotaguard_types::StoreConfig::default()));
        let notifier = Arc::new(RecordingNotifier::new());
        let svc = AlertService::with_clock(store, notifier.clone(), config, clock);
        (svc, notifier)
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_one_duplicate_within_window_suppressed_then_redelivers_after() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new(chrono::Utc::now()));
        let config = AlertConfig {
            dedup_window: Duration::from_secs(30 * 60),
            ..AlertConfig::default()
        };
        let (svc, notifier) = service(clock, config);
        let account_id = AccountId::new("a1");

        svc.process_alert(alert_at(&account_id, 85.0, 86.0)).await.unwrap();
        svc.process_alert(alert_at(&account_id, 85.0, 87.0)).await.unwrap();
        assert_eq!(notifier.alerts().len(), 1, "second alert within the dedup window must be suppressed");

        tokio::time::advance(Duration::from_secs(30 * 60 + 1)).await;
        svc.process_alert(alert_at(&account_id, 85.0, 88.0)).await.unwrap();
        assert_eq!(notifier.alerts().len(), 2, "alert after the dedup window elapses must redeliver");
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_six_muted_service_suppresses_until_mute_expires() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new(chrono::Utc::now()));
        let (svc, notifier) = service(clock, AlertConfig::default());
        let account_id = AccountId::new("a1");

        svc.mute(Some(Duration::from_secs(60)), "maintenance window".into());
        svc.process_alert(alert_at(&account_id, 85.0, 86.0)).await.unwrap();
        assert!(notifier.alerts().is_empty(), "muted service must suppress delivery");
        assert!(svc.mute_remaining().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        svc.process_alert(alert_at(&account_id, 85.0, 86.0)).await.unwrap();
        assert_eq!(notifier.alerts().len(), 1, "alert after mute expires must deliver");
        assert!(svc.mute_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_alert_is_queued_then_drained_once_the_bucket_refills() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new(chrono::Utc::now()));
        let config = AlertConfig {
            rate_per_minute: 1,
            ..AlertConfig::default()
        };
        let (svc, notifier) = service(clock, config);
        let account_id = AccountId::new("a1");

        svc.process_alert(alert_at(&account_id, 85.0, 86.0)).await.unwrap();
        assert_eq!(notifier.alerts().len(), 1);

        // Bucket has a single token, spent above; a different alert-type
        // discriminant keeps this a distinct dedup key and so it hits the
        // throttle instead of being collapsed as a duplicate.
        svc.process_alert(exhausted_alert(&account_id)).await.unwrap();
        assert_eq!(notifier.alerts().len(), 1, "throttled alert must not deliver immediately");

        tokio::time::advance(Duration::from_secs(60)).await;
        svc.drain_pending_once().await;
        assert_eq!(notifier.alerts().len(), 2, "drainer must deliver once the bucket refills");
    }

    #[tokio::test]
    async fn update_config_rejects_an_unparseable_digest_time() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new(chrono::Utc::now()));
        let (svc, _notifier) = service(clock, AlertConfig::default());
        let bad = AlertConfig {
            digest_time: "25:99".to_owned(),
            ..AlertConfig::default()
        };
        let result = svc.update_config(bad);
        assert!(matches!(result, Err(QuotaGuardError::ConfigInvalid(_))));
        assert_eq!(svc.config_snapshot().digest_time, AlertConfig::default().digest_time);
    }

    #[tokio::test]
    async fn update_config_rejects_an_unknown_timezone() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new(chrono::Utc::now()));
        let (svc, _notifier) = service(clock, AlertConfig::default());
        let bad = AlertConfig {
            digest_timezone: "Mars/Olympus_Mons".to_owned(),
            ..AlertConfig::default()
        };
        assert!(matches!(svc.update_config(bad), Err(QuotaGuardError::ConfigInvalid(_))));
    }

    #[tokio::test]
    async fn update_config_applies_a_new_mute_default_to_subsequent_mutes() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new(chrono::Utc::now()));
        let (svc, _notifier) = service(clock, AlertConfig::default());
        let new_config = AlertConfig {
            mute_default_duration: Duration::from_secs(5),
            ..AlertConfig::default()
        };
        svc.update_config(new_config).unwrap();
        assert_eq!(svc.config_snapshot().mute_default_duration, Duration::from_secs(5));

        svc.mute(None, "picked up new default".to_owned());
        let remaining = svc.mute_remaining().expect("mute is active").to_std().unwrap();
        assert!(remaining <= Duration::from_secs(5) && remaining > Duration::from_secs(4));
    }
}
