use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quotaguard_core::{
    store::{Accounts, Credentials, QuotaEvent, QuotaSubscription, Quotas, Reservations, Settings},
    Clock, Store,
};
use quotaguard_types::{
    Account, AccountCredentials, AccountId, QuotaInfo, Reservation, ReservationId, SettingValue,
    StoreConfig,
};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

/// In-memory reference implementation of `quotaguard_core::Store`.
///
/// Each table is a separate `RwLock<HashMap<...>>` rather than a single
/// lock or a concurrent map, matching the teacher's preference for
/// explicit lock types scoped to one table at a time. Per-account pub/sub
/// uses a `tokio::sync::broadcast` channel created lazily on first
/// `subscribe`; a lagging receiver simply misses intermediate events,
/// which is acceptable because subscribers are expected to resync via
/// `Quotas::get`.
pub struct MemoryStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
    credentials: RwLock<HashMap<AccountId, AccountCredentials>>,
    quotas: RwLock<HashMap<AccountId, QuotaInfo>>,
    reservations: RwLock<HashMap<ReservationId, Reservation>>,
    settings: RwLock<HashMap<String, SettingValue>>,
    subscribers: RwLock<HashMap<AccountId, broadcast::Sender<QuotaEvent>>>,
    config: StoreConfig,
}

impl MemoryStore {
    /// Builds an empty store with the given retention/buffering configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
            quotas: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
            settings: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Spawns the background cleanup task that prunes stale quota snapshots
    /// and terminal-status reservations past their retention window.
    ///
    /// Returns a handle that stops the task on `stop()`/drop, mirroring the
    /// teacher's `StreamHandle` shutdown shape.
    pub fn spawn_cleanup(self: &Arc<Self>, clock: Arc<dyn Clock>) -> CleanupHandle {
        let store = Arc::clone(self);
        let interval = self.config.cleanup_interval;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    () = clock.sleep(interval) => {
                        store.sweep_retention(clock.now()).await;
                    }
                }
            }
        });
        CleanupHandle {
            inner: Some(handle),
            token,
        }
    }

    async fn sweep_retention(&self, now: DateTime<Utc>) {
        let quota_retention = chrono::Duration::from_std(self.config.quota_retention)
            .unwrap_or(chrono::Duration::zero());
        let reservation_retention = chrono::Duration::from_std(self.config.reservation_retention)
            .unwrap_or(chrono::Duration::zero());

        {
            let mut quotas = self.quotas.write().await;
            quotas.retain(|_, q| now - q.collected_at < quota_retention);
        }
        {
            let mut reservations = self.reservations.write().await;
            reservations.retain(|_, r| {
                if !r.status.is_terminal() {
                    return true;
                }
                match r.released_at {
                    Some(released_at) => now - released_at < reservation_retention,
                    None => true,
                }
            });
        }
    }

    fn publish(
        subscribers: &HashMap<AccountId, broadcast::Sender<QuotaEvent>>,
        account_id: &AccountId,
        event: QuotaEvent,
    ) {
        if let Some(tx) = subscribers.get(account_id) {
            // A send error just means there are currently no receivers; the
            // event is a hint and nothing depends on it being delivered.
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl Accounts for MemoryStore {
    async fn get(&self, account_id: &AccountId) -> Option<Account> {
        self.accounts.read().await.get(account_id).cloned()
    }

    async fn set(&self, account: Account) {
        self.accounts.write().await.insert(account.id.clone(), account);
    }

    async fn delete(&self, account_id: &AccountId) {
        self.accounts.write().await.remove(account_id);
    }

    async fn list(&self) -> Vec<Account> {
        self.accounts.read().await.values().cloned().collect()
    }

    async fn list_enabled(&self) -> Vec<Account> {
        self.accounts
            .read()
            .await
            .values()
            .filter(|a| a.enabled)
            .cloned()
            .collect()
    }

    async fn set_blocked_until(&self, account_id: &AccountId, until: Option<DateTime<Utc>>) {
        if let Some(account) = self.accounts.write().await.get_mut(account_id) {
            account.blocked_until = until;
        }
    }
}

#[async_trait]
impl Credentials for MemoryStore {
    async fn get(&self, account_id: &AccountId) -> Option<AccountCredentials> {
        self.credentials.read().await.get(account_id).cloned()
    }

    async fn set(&self, credentials: AccountCredentials) {
        self.credentials
            .write()
            .await
            .insert(credentials.account_id.clone(), credentials);
    }

    async fn delete(&self, account_id: &AccountId) {
        self.credentials.write().await.remove(account_id);
    }
}

#[async_trait]
impl Quotas for MemoryStore {
    async fn get(&self, account_id: &AccountId) -> Option<QuotaInfo> {
        self.quotas.read().await.get(account_id).cloned()
    }

    async fn set(&self, quota: QuotaInfo) {
        let account_id = quota.account_id.clone();
        let new_pct = quota.effective_remaining_with_virtual();
        let old_pct = {
            let mut quotas = self.quotas.write().await;
            let old_pct = quotas.get(&account_id).map(QuotaInfo::effective_remaining_with_virtual);
            quotas.insert(account_id.clone(), quota);
            old_pct
        };
        if old_pct != Some(new_pct) {
            let subscribers = self.subscribers.read().await;
            Self::publish(&subscribers, &account_id, QuotaEvent { old_pct, new_pct });
        }
    }

    async fn update(
        &self,
        account_id: &AccountId,
        f: Box<dyn FnOnce(Option<QuotaInfo>) -> QuotaInfo + Send>,
    ) {
        let (old_pct, new_quota) = {
            let mut quotas = self.quotas.write().await;
            let existing = quotas.get(account_id).cloned();
            let old_pct = existing.as_ref().map(QuotaInfo::effective_remaining_with_virtual);
            let updated = f(existing);
            quotas.insert(account_id.clone(), updated.clone());
            (old_pct, updated)
        };
        let new_pct = new_quota.effective_remaining_with_virtual();
        if old_pct != Some(new_pct) {
            let subscribers = self.subscribers.read().await;
            Self::publish(&subscribers, account_id, QuotaEvent { old_pct, new_pct });
        }
    }

    async fn delete(&self, account_id: &AccountId) {
        self.quotas.write().await.remove(account_id);
    }

    async fn list(&self) -> Vec<QuotaInfo> {
        self.quotas.read().await.values().cloned().collect()
    }

    async fn subscribe(&self, account_id: &AccountId) -> Box<dyn QuotaSubscription> {
        let mut subscribers = self.subscribers.write().await;
        let tx = subscribers.entry(account_id.clone()).or_insert_with(|| {
            let (tx, _rx) = broadcast::channel(self.config.subscriber_buffer.max(1));
            tx
        });
        Box::new(BroadcastSubscription { rx: tx.subscribe() })
    }
}

#[async_trait]
impl Reservations for MemoryStore {
    async fn get(&self, reservation_id: &ReservationId) -> Option<Reservation> {
        self.reservations.read().await.get(reservation_id).cloned()
    }

    async fn set(&self, reservation: Reservation) {
        self.reservations
            .write()
            .await
            .insert(reservation.id.clone(), reservation);
    }

    async fn delete(&self, reservation_id: &ReservationId) {
        self.reservations.write().await.remove(reservation_id);
    }

    async fn list(&self) -> Vec<Reservation> {
        self.reservations.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl Settings for MemoryStore {
    async fn get(&self, key: &str) -> Option<SettingValue> {
        self.settings.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: SettingValue) {
        self.settings.write().await.insert(key.to_owned(), value);
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }
}

struct BroadcastSubscription {
    rx: broadcast::Receiver<QuotaEvent>,
}

#[async_trait]
impl QuotaSubscription for BroadcastSubscription {
    async fn next(&mut self) -> Option<QuotaEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Handle to the `MemoryStore` cleanup task; stopping it is cooperative via
/// a `CancellationToken`, mirroring the teacher's `StreamHandle` shape.
#[derive(Debug)]
pub struct CleanupHandle {
    inner: Option<tokio::task::JoinHandle<()>>,
    token: CancellationToken,
}

impl CleanupHandle {
    /// Requests cooperative shutdown and awaits the task's completion.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            let _ = inner.await;
        }
    }

    /// Force-aborts the cleanup task without waiting for it to observe cancellation.
    pub fn abort(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.abort();
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            inner.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaguard_types::{DimensionType, Provider, QuotaSource, WindowSemantics};

    fn sample_quota(account_id: &str, remaining_pct: f64) -> QuotaInfo {
        QuotaInfo {
            account_id: AccountId::new(account_id),
            provider: Provider::OpenAiCodex,
            tier: "pro".into(),
            dimensions: vec![quotaguard_types::Dimension {
                dimension_type: DimensionType::Requests,
                limit: 100,
                used: (100.0 - remaining_pct) as i64,
                remaining: remaining_pct as i64,
                reset_at: None,
                window_semantics: WindowSemantics::Fixed,
                source: QuotaSource::Polling,
                confidence: 0.8,
            }],
            effective_remaining_pct: remaining_pct,
            virtual_used_pct: 0.0,
            is_throttled: false,
            source: QuotaSource::Polling,
            confidence: 0.8,
            collected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn get_set_round_trips_quota() {
        let store = MemoryStore::new(StoreConfig::default());
        let quota = sample_quota("a1", 50.0);
        Quotas::set(&store, quota.clone()).await;
        let fetched = Quotas::get(&store, &quota.account_id).await.unwrap();
        assert!((fetched.effective_remaining_pct - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn subscribe_receives_event_on_set() {
        let store = MemoryStore::new(StoreConfig::default());
        let account_id = AccountId::new("a1");
        let mut sub = Quotas::subscribe(&store, &account_id).await;
        Quotas::set(&store, sample_quota("a1", 40.0)).await;
        let event = sub.next().await.unwrap();
        assert!(event.old_pct.is_none());
        assert!((event.new_pct - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn identical_quota_set_is_a_no_op_on_subscribers() {
        let store = MemoryStore::new(StoreConfig::default());
        let account_id = AccountId::new("a1");
        Quotas::set(&store, sample_quota("a1", 40.0)).await;
        let mut sub = Quotas::subscribe(&store, &account_id).await;
        Quotas::set(&store, sample_quota("a1", 40.0)).await;
        let result = tokio::time::timeout(std::time::Duration::from_millis(20), sub.next()).await;
        assert!(result.is_err(), "re-setting an identical snapshot must not publish an event");
    }

    #[tokio::test]
    async fn identical_quota_update_is_a_no_op_on_subscribers() {
        let store = MemoryStore::new(StoreConfig::default());
        let account_id = AccountId::new("a1");
        Quotas::set(&store, sample_quota("a1", 40.0)).await;
        let mut sub = Quotas::subscribe(&store, &account_id).await;
        Quotas::update(&store, &account_id, Box::new(|existing| existing.expect("snapshot present"))).await;
        let result = tokio::time::timeout(std::time::Duration::from_millis(20), sub.next()).await;
        assert!(result.is_err(), "an update that leaves the snapshot unchanged must not publish an event");
    }

    #[tokio::test]
    async fn blocked_until_is_set_on_account() {
        let store = MemoryStore::new(StoreConfig::default());
        let account_id = AccountId::new("a1");
        Accounts::set(
            &store,
            Account {
                id: account_id.clone(),
                provider: Provider::OpenAiCodex,
                provider_type: quotaguard_types::ProviderType::ApiKey,
                tier: "pro".into(),
                enabled: true,
                priority: 0,
                concurrency_limit: 0,
                cost_coefficient: 1.0,
                blocked_until: None,
                credentials_ref: "ref".into(),
            },
        )
        .await;
        let until = Utc::now() + chrono::Duration::seconds(30);
        Accounts::set_blocked_until(&store, &account_id, Some(until)).await;
        let account = Accounts::get(&store, &account_id).await.unwrap();
        assert_eq!(account.blocked_until, Some(until));
    }

    #[tokio::test]
    async fn cleanup_prunes_stale_quota_snapshots() {
        let mut config = StoreConfig::default();
        config.quota_retention = std::time::Duration::from_millis(1);
        config.cleanup_interval = std::time::Duration::from_millis(5);
        let store = Arc::new(MemoryStore::new(config));
        let clock: Arc<dyn Clock> = Arc::new(quotaguard_core::SystemClock);
        Quotas::set(&store, sample_quota("a1", 10.0)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let handle = store.spawn_cleanup(Arc::clone(&clock));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        handle.stop().await;
        assert!(Quotas::get(&store, &AccountId::new("a1")).await.is_none());
    }
}
