use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quotaguard_alerts::{AlertService, AlertsHandle};
use quotaguard_collector::{ActiveCollector, FlusherHandle, HeaderAdapter, HeaderBag, JitterSource, PassiveCollector, PollerHandle, RandomJitter};
use quotaguard_core::{Accounts, Clock, Credentials, Notifier, QuotaFetcher, QuotaGuardError, SharedStore, SystemClock};
use quotaguard_limiter::Limiter;
use quotaguard_reservation::{ReservationManager, SweeperHandle};
use quotaguard_router::{RouteDecision, RouteRequest, Router};
use quotaguard_store::{CleanupHandle, MemoryStore};
use quotaguard_types::{setting_keys, Account, AccountCredentials, AccountId, Provider, ReservationId};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;

/// How often the settings poller re-checks the Store's hot-reconfigurable
/// keys (Module H) and feeds changes into the Router and Alert Service.
const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Applies every well-known settings-namespace key present in `store` onto
/// `router`'s, `alerts`', and `active`'s configuration, read-merge-write
/// style since every `update_config` takes a full config rather than a
/// partial patch. Invalid values are rejected by the respective
/// `update_config` and leave the prior config in place.
///
/// `ROUTER_FALLBACK_CHAINS` is reserved in [`setting_keys`] but has no
/// defined wire format yet, so it is intentionally not applied here.
async fn apply_settings_once(store: &SharedStore, router: &Router, alerts: &AlertService, active: &ActiveCollector) {
    let mut router_config = router.config_snapshot().await;
    let mut router_changed = false;
    if let Some(v) = quotaguard_core::Settings::get_float(&**store, setting_keys::ROUTER_WARNING).await {
        router_config.warning = v;
        router_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_float(&**store, setting_keys::ROUTER_SWITCH).await {
        router_config.switch = v;
        router_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_float(&**store, setting_keys::ROUTER_CRITICAL).await {
        router_config.critical = v;
        router_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_float(&**store, setting_keys::ROUTER_MIN_SAFE).await {
        router_config.min_safe = v;
        router_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_int(&**store, setting_keys::ROUTER_MIN_DWELL_MS).await {
        router_config.min_dwell_time = Duration::from_millis(v.max(0) as u64);
        router_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_int(&**store, setting_keys::ROUTER_COOLDOWN_MS).await {
        router_config.cooldown_after_switch = Duration::from_millis(v.max(0) as u64);
        router_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_float(&**store, setting_keys::ROUTER_HYSTERESIS_MARGIN).await {
        router_config.hysteresis_margin = v;
        router_changed = true;
    }
    if router_changed {
        let _ = router.update_config(router_config).await;
    }

    let mut alert_config = alerts.config_snapshot();
    let mut alert_changed = false;
    if let Some(v) = quotaguard_core::Settings::get_int(&**store, setting_keys::ALERTS_MUTE_DURATION_MS).await {
        alert_config.mute_default_duration = Duration::from_millis(v.max(0) as u64);
        alert_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_string(&**store, setting_keys::ALERTS_DIGEST_TIME).await {
        alert_config.digest_time = v;
        alert_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_string(&**store, setting_keys::ALERTS_DIGEST_TIMEZONE).await {
        alert_config.digest_timezone = v;
        alert_changed = true;
    }
    if alert_changed {
        let _ = alerts.update_config(alert_config);
    }

    let mut active_config = active.config_snapshot();
    let mut active_changed = false;
    if let Some(v) = quotaguard_core::Settings::get_int(&**store, setting_keys::COLLECTOR_CHECK_INTERVAL_MS).await {
        active_config.base_interval = Duration::from_millis(v.max(0) as u64);
        active_changed = true;
    }
    if let Some(v) = quotaguard_core::Settings::get_int(&**store, setting_keys::COLLECTOR_FETCH_TIMEOUT_MS).await {
        active_config.fetch_timeout = Duration::from_millis(v.max(0) as u64);
        active_changed = true;
    }
    if active_changed {
        let _ = active.update_config(active_config);
    }
}

/// Handle to the settings hot-reload poller task.
#[derive(Debug)]
pub struct SettingsPollerHandle {
    inner: Option<tokio::task::JoinHandle<()>>,
    token: CancellationToken,
}

impl SettingsPollerHandle {
    /// Requests cooperative shutdown and awaits the poller's completion.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            let _ = inner.await;
        }
    }
}

impl Drop for SettingsPollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            inner.abort();
        }
    }
}

/// Spawns the settings hot-reload poller, applying Module H's well-known
/// keys to the Router, Alert Service, and active collector at a fixed
/// interval.
fn spawn_settings_poller(
    store: SharedStore,
    router: Arc<Router>,
    alerts: Arc<AlertService>,
    active: Arc<ActiveCollector>,
    clock: Arc<dyn Clock>,
) -> SettingsPollerHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = task_token.cancelled() => break,
                () = clock.sleep(SETTINGS_POLL_INTERVAL) => {
                    apply_settings_once(&store, &router, &alerts, &active).await;
                }
            }
        }
    });
    SettingsPollerHandle { inner: Some(handle), token }
}

/// Orchestrates the Store, Limiter, hybrid Collector, Reservation Manager,
/// Router, and Alert Service behind one handle.
///
/// Construction wires every component's reference the same way `Borsa`
/// wires registered connectors: the facade owns no routing logic of its
/// own, only delegation plus lifecycle for the background tasks each
/// component spawns.
pub struct QuotaGuard {
    store: SharedStore,
    default_store: Option<Arc<MemoryStore>>,
    limiter: Arc<Limiter>,
    passive: Arc<PassiveCollector>,
    active: Arc<ActiveCollector>,
    reservations: Arc<ReservationManager>,
    router: Arc<Router>,
    alerts: Arc<AlertService>,
    clock: Arc<dyn Clock>,
}

impl QuotaGuard {
    /// Starts building a `QuotaGuard` with default settings.
    #[must_use]
    pub fn builder() -> QuotaGuardBuilder {
        QuotaGuardBuilder::new()
    }

    /// The underlying store, for callers that need direct CRUD access
    /// beyond the convenience methods below.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Registers (or replaces) a fleet account.
    pub async fn register_account(&self, account: Account) {
        Accounts::set(&*self.store, account).await;
    }

    /// Registers (or replaces) an account's credentials.
    pub async fn register_credentials(&self, credentials: AccountCredentials) {
        Credentials::set(&*self.store, credentials).await;
    }

    /// Routes one request to an account, reserving estimated cost against it.
    pub async fn route(&self, request: RouteRequest) -> Result<RouteDecision, QuotaGuardError> {
        self.router.route(request).await
    }

    /// Releases a reservation with its actual cost, truing up the
    /// account's `virtualUsedPct`.
    pub async fn commit_reservation(&self, reservation_id: &ReservationId, actual_cost_pct: f64) -> Result<(), QuotaGuardError> {
        self.reservations.commit(reservation_id, actual_cost_pct).await
    }

    /// Releases a reservation without charging any cost against the account.
    pub async fn cancel_reservation(&self, reservation_id: &ReservationId) -> Result<(), QuotaGuardError> {
        self.reservations.cancel(reservation_id).await
    }

    /// Diagnostic accessor for an account's current `virtualUsedPct`.
    pub async fn virtual_used_pct(&self, account_id: &AccountId) -> f64 {
        self.reservations.virtual_used_pct(account_id).await
    }

    /// Attempts to acquire a concurrency slot for `account_id`; non-blocking.
    pub async fn acquire_slot(&self, account_id: &AccountId) -> bool {
        self.limiter.acquire(account_id).await
    }

    /// Releases a previously acquired concurrency slot.
    pub async fn release_slot(&self, account_id: &AccountId) {
        self.limiter.release(account_id).await;
    }

    /// Enqueues a caller-submitted header snapshot for passive ingestion.
    /// Non-blocking; fails with `QueueFull` once the buffer is saturated.
    pub fn ingest_passive(&self, account_id: AccountId, provider: Option<Provider>, headers: HeaderBag) -> Result<(), QuotaGuardError> {
        self.passive.ingest(account_id, provider, headers)
    }

    /// Runs one active-polling cycle immediately, outside the poller's
    /// ticker. Mostly useful for tests and manual on-demand refreshes.
    pub async fn poll_once(&self) -> Result<(), QuotaGuardError> {
        self.active.poll_once(&*self.store).await
    }

    /// Engages the Alert Service's mute gate for `duration` (or its configured default).
    pub fn mute(&self, duration: Option<Duration>, reason: String) {
        self.alerts.mute(duration, reason);
    }

    /// Remaining mute duration, if the Alert Service is currently muted.
    #[must_use]
    pub fn mute_remaining(&self) -> Option<chrono::Duration> {
        self.alerts.mute_remaining()
    }

    /// Current wall-clock instant per the injected `Clock`, exposed so
    /// callers building on top of `QuotaGuard` can align their own timing
    /// with it in tests.
    #[must_use]
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Spawns every background task this orchestrator owns: the active
    /// poller, the passive flusher, the reservation sweeper, the Alert
    /// Service's four tasks, the settings hot-reload poller, and (only for
    /// the built-in in-memory store) its retention sweep.
    pub fn start(self: &Arc<Self>) -> QuotaGuardHandle {
        let poller = quotaguard_collector::spawn_polling_loop(Arc::clone(&self.active), Arc::clone(&self.store));
        let flusher = Arc::clone(&self.passive).spawn_flusher(Arc::clone(&self.store));
        let sweeper = Arc::clone(&self.reservations).spawn_sweeper();
        let alerts = self.alerts.spawn();
        let store_cleanup = self.default_store.as_ref().map(|store| store.spawn_cleanup(Arc::clone(&self.clock)));
        let settings_poller = spawn_settings_poller(
            Arc::clone(&self.store),
            Arc::clone(&self.router),
            Arc::clone(&self.alerts),
            Arc::clone(&self.active),
            Arc::clone(&self.clock),
        );

        QuotaGuardHandle {
            poller: Some(poller),
            flusher: Some(flusher),
            sweeper: Some(sweeper),
            alerts: Some(alerts),
            store_cleanup,
            settings_poller: Some(settings_poller),
        }
    }
}

/// Handle to every background task a running `QuotaGuard` owns. Dropping
/// it without calling `stop` aborts every task immediately, matching each
/// constituent handle's own `Drop` behavior.
pub struct QuotaGuardHandle {
    poller: Option<PollerHandle>,
    flusher: Option<FlusherHandle>,
    sweeper: Option<SweeperHandle>,
    alerts: Option<AlertsHandle>,
    store_cleanup: Option<CleanupHandle>,
    settings_poller: Option<SettingsPollerHandle>,
}

impl QuotaGuardHandle {
    /// Cancels and awaits every background task's cooperative shutdown, in
    /// no particular order since none depend on another's liveness.
    pub async fn stop(mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
        if let Some(flusher) = self.flusher.take() {
            flusher.stop().await;
        }
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop().await;
        }
        if let Some(alerts) = self.alerts.take() {
            alerts.stop().await;
        }
        if let Some(store_cleanup) = self.store_cleanup.take() {
            store_cleanup.stop().await;
        }
        if let Some(settings_poller) = self.settings_poller.take() {
            settings_poller.stop().await;
        }
    }
}

/// Builder for a `QuotaGuard` orchestrator.
pub struct QuotaGuardBuilder {
    store: Option<SharedStore>,
    notifier: Option<Arc<dyn Notifier>>,
    fetchers: HashMap<Provider, Arc<dyn QuotaFetcher>>,
    adapters: Vec<Arc<dyn HeaderAdapter>>,
    settings: Settings,
    clock: Option<Arc<dyn Clock>>,
    jitter: Option<Arc<dyn JitterSource>>,
}

impl Default for QuotaGuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaGuardBuilder {
    /// Creates a builder with default settings, no store, no notifier, and
    /// no registered fetchers or adapters. `notifier` must be set before
    /// `build` succeeds; everything else has a workable default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            notifier: None,
            fetchers: HashMap::new(),
            adapters: Vec::new(),
            settings: Settings::default(),
            clock: None,
            jitter: None,
        }
    }

    /// Supplies the typed settings bundle, replacing every component default.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Supplies a custom `Store` implementation instead of the built-in
    /// in-memory one. The built-in retention sweep is then the caller's
    /// responsibility; `QuotaGuardHandle::stop` will simply have nothing
    /// to stop for it.
    #[must_use]
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers the transport the Alert Service delivers through. Required.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Registers a provider's quota fetcher for the active collector.
    #[must_use]
    pub fn with_fetcher(mut self, provider: Provider, fetcher: Arc<dyn QuotaFetcher>) -> Self {
        self.fetchers.insert(provider, fetcher);
        self
    }

    /// Registers a header adapter for passive ingestion.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn HeaderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Injects a `Clock`, for deterministic dwell/cooldown/digest/breaker
    /// tests. Defaults to `SystemClock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Injects the active collector's jitter source. Defaults to `RandomJitter`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Builds the `QuotaGuard`, wiring every component over a shared store
    /// and clock.
    ///
    /// # Errors
    /// Returns `QuotaGuardError::ConfigInvalid` if no notifier was registered.
    pub async fn build(self) -> Result<Arc<QuotaGuard>, QuotaGuardError> {
        let notifier = self
            .notifier
            .ok_or_else(|| QuotaGuardError::ConfigInvalid("QuotaGuardBuilder requires with_notifier before build".to_owned()))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let (store, default_store) = match self.store {
            Some(store) => (store, None),
            None => {
                let memory = Arc::new(MemoryStore::new(self.settings.store));
                (Arc::clone(&memory) as SharedStore, Some(memory))
            }
        };

        let limiter = Arc::new(Limiter::with_clock(self.settings.limiter, Arc::clone(&clock)));

        let passive = Arc::new(PassiveCollector::new(self.settings.passive));
        for adapter in self.adapters {
            passive.register_adapter(adapter).await;
        }

        let jitter = self.jitter.unwrap_or_else(|| Arc::new(RandomJitter) as Arc<dyn JitterSource>);
        let active = Arc::new(ActiveCollector::with_clock_and_jitter(self.settings.active, self.fetchers, Arc::clone(&clock), jitter));

        let reservations = Arc::new(ReservationManager::with_clock(Arc::clone(&store), self.settings.reservation, Arc::clone(&clock)));

        let router = Arc::new(Router::with_clock(Arc::clone(&store), Arc::clone(&reservations), self.settings.router, Arc::clone(&clock)));

        let alerts = AlertService::with_clock(Arc::clone(&store), notifier, self.settings.alert, Arc::clone(&clock));

        Ok(Arc::new(QuotaGuard {
            store,
            default_store,
            limiter,
            passive,
            active,
            reservations,
            router,
            alerts,
            clock,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use quotaguard_core::Quotas;
    use quotaguard_mock::{MockFetcher, RecordingNotifier, VirtualClock};
    use quotaguard_types::{Dimension, DimensionType, ProviderType, QuotaSource, WindowSemantics};

    use super::*;

    fn account(id: &str) -> Account {
        Account {
            id: AccountId::new(id),
            provider: Provider::OpenAiCodex,
            provider_type: ProviderType::ApiKey,
            tier: "pro".into(),
            enabled: true,
            priority: 0,
            concurrency_limit: 0,
            cost_coefficient: 0.0,
            blocked_until: None,
            credentials_ref: format!("{id}-creds"),
        }
    }

    fn quota_info(account_id: &AccountId, remaining_pct: f64) -> quotaguard_types::QuotaInfo {
        quotaguard_types::QuotaInfo {
            account_id: account_id.clone(),
            provider: Provider::OpenAiCodex,
            tier: "pro".into(),
            dimensions: vec![Dimension {
                dimension_type: DimensionType::Requests,
                limit: 100,
                used: (100.0 - remaining_pct) as i64,
                remaining: remaining_pct as i64,
                reset_at: None,
                window_semantics: WindowSemantics::Unknown,
                source: QuotaSource::Polling,
                confidence: 0.9,
            }],
            effective_remaining_pct: remaining_pct,
            virtual_used_pct: 0.0,
            is_throttled: false,
            source: QuotaSource::Polling,
            confidence: 0.9,
            collected_at: Utc::now(),
        }
    }

    struct FixedAdapter;

    impl HeaderAdapter for FixedAdapter {
        fn provider(&self) -> Provider {
            Provider::OpenAiCodex
        }

        fn parse(&self, account_id: &AccountId, headers: &HeaderBag) -> Option<quotaguard_types::QuotaInfo> {
            let remaining: f64 = headers.get("x-remaining-pct")?.parse().ok()?;
            Some(quota_info(account_id, remaining))
        }
    }

    async fn guard_with_notifier() -> (Arc<QuotaGuard>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(VirtualClock::new(Utc::now())) as Arc<dyn Clock>;
        let guard = QuotaGuardBuilder::new()
            .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
            .with_clock(clock)
            .build()
            .await
            .expect("build succeeds once a notifier is registered");
        (guard, notifier)
    }

    #[tokio::test]
    async fn build_fails_without_a_registered_notifier() {
        let result = QuotaGuardBuilder::new().build().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn routes_to_the_only_candidate_and_reserves_against_it() {
        let (guard, _notifier) = guard_with_notifier().await;
        let acct = account("acct-1");
        guard.register_account(acct.clone()).await;
        Quotas::set(&*guard.store(), quota_info(&acct.id, 90.0)).await;

        let decision = guard
            .route(RouteRequest {
                correlation_id: quotaguard_types::CorrelationId::new("corr-1"),
                estimated_cost_pct: 5.0,
                policy: None,
                ttl: None,
            })
            .await
            .expect("one enabled, unblocked, quota-known candidate exists");

        assert_eq!(decision.account_id, acct.id);
        assert!((guard.virtual_used_pct(&acct.id).await - 5.0).abs() < 1e-9);

        guard
            .commit_reservation(&decision.reservation.id, 4.0)
            .await
            .expect("reservation is still outstanding");
        assert!((guard.virtual_used_pct(&acct.id).await - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn routing_with_no_registered_accounts_fails() {
        let (guard, _notifier) = guard_with_notifier().await;
        let result = guard
            .route(RouteRequest {
                correlation_id: quotaguard_types::CorrelationId::new("corr-2"),
                estimated_cost_pct: 1.0,
                policy: None,
                ttl: None,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn passive_ingestion_flushes_to_the_store() {
        let notifier = Arc::new(RecordingNotifier::new());
        let guard = QuotaGuardBuilder::new()
            .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
            .with_adapter(Arc::new(FixedAdapter))
            .settings(Settings {
                passive: quotaguard_types::PassiveCollectorConfig {
                    flush_period: Duration::from_millis(10),
                    ..Default::default()
                },
                ..Settings::default()
            })
            .build()
            .await
            .unwrap();

        let mut headers = HeaderBag::new();
        headers.insert("x-remaining-pct".into(), "42".into());
        guard.ingest_passive(AccountId::new("acct-2"), None, headers).unwrap();

        let handle = guard.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let stored = Quotas::get(&*guard.store(), &AccountId::new("acct-2"))
            .await
            .expect("flusher wrote the parsed snapshot");
        assert!((stored.effective_remaining_pct - 42.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn acquire_and_release_slot_round_trip() {
        let (guard, _notifier) = guard_with_notifier().await;
        let account_id = AccountId::new("acct-3");
        assert!(guard.acquire_slot(&account_id).await);
        guard.release_slot(&account_id).await;
    }

    #[tokio::test]
    async fn mute_suppresses_until_it_expires() {
        let (guard, _notifier) = guard_with_notifier().await;
        guard.mute(Some(Duration::from_secs(60)), "maintenance window".to_owned());
        assert!(guard.mute_remaining().is_some());
    }

    #[tokio::test]
    async fn with_fetcher_wires_the_active_collector_and_poll_once_populates_the_store() {
        let notifier = Arc::new(RecordingNotifier::new());
        let acct = account("acct-4");
        let fetcher = Arc::new(MockFetcher::new("fetcher-4"));
        fetcher.push(acct.id.clone(), quotaguard_mock::FetchBehavior::Return(quota_info(&acct.id, 77.0)));

        let guard = QuotaGuardBuilder::new()
            .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
            .with_fetcher(Provider::OpenAiCodex, fetcher)
            .build()
            .await
            .unwrap();
        guard.register_account(acct.clone()).await;
        guard
            .register_credentials(AccountCredentials {
                account_id: acct.id.clone(),
                token: "test-token".into(),
                refresh_token: None,
                expires_at: None,
            })
            .await;

        guard.poll_once().await.expect("the only registered fetcher returns Ok");
        let stored = Quotas::get(&*guard.store(), &acct.id).await.expect("poll_once wrote a snapshot");
        assert!((stored.effective_remaining_pct - 77.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn settings_poller_applies_valid_overrides_and_rejects_invalid_ones() {
        use quotaguard_types::SettingValue;

        let (guard, _notifier) = guard_with_notifier().await;
        let original_warning = guard.router.config_snapshot().await.warning;

        quotaguard_core::Settings::set(&*guard.store, setting_keys::ROUTER_MIN_SAFE, SettingValue::Float(12.5)).await;
        quotaguard_core::Settings::set(&*guard.store, setting_keys::ALERTS_MUTE_DURATION_MS, SettingValue::Int(2_000)).await;
        apply_settings_once(&guard.store, &guard.router, &guard.alerts, &guard.active).await;

        assert!((guard.router.config_snapshot().await.min_safe - 12.5).abs() < 1e-9);
        assert_eq!(guard.alerts.config_snapshot().mute_default_duration, Duration::from_millis(2_000));
        assert!((guard.router.config_snapshot().await.warning - original_warning).abs() < 1e-9, "unset keys are left untouched");

        quotaguard_core::Settings::set(&*guard.store, setting_keys::ROUTER_MIN_SAFE, SettingValue::Float(150.0)).await;
        apply_settings_once(&guard.store, &guard.router, &guard.alerts, &guard.active).await;
        assert!(
            (guard.router.config_snapshot().await.min_safe - 12.5).abs() < 1e-9,
            "an out-of-range min_safe is rejected by Router::update_config and the prior value is kept"
        );

        quotaguard_core::Settings::set(&*guard.store, setting_keys::COLLECTOR_CHECK_INTERVAL_MS, SettingValue::Int(30_000)).await;
        apply_settings_once(&guard.store, &guard.router, &guard.alerts, &guard.active).await;
        assert_eq!(guard.active.config_snapshot().base_interval, Duration::from_millis(30_000));
    }
}
