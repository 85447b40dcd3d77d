use async_trait::async_trait;
use quotaguard_types::{
    Account, AccountCredentials, QuotaInfo, Reservation, ReservationId, SettingValue,
};

/// A change notification delivered to a per-account subscriber.
///
/// Delivery is best-effort: if a subscriber's buffer is full, the event is
/// dropped and the subscriber is expected to refetch via `Quotas::get` to
/// resync — "events are hints, state is authoritative."
#[derive(Debug, Clone, Copy)]
pub struct QuotaEvent {
    /// `effective_remaining_with_virtual` before the update, if a prior snapshot existed.
    pub old_pct: Option<f64>,
    /// `effective_remaining_with_virtual` after the update.
    pub new_pct: f64,
}

/// A subscription handle returned by [`Quotas::subscribe`].
#[async_trait]
pub trait QuotaSubscription: Send {
    /// Awaits the next event, or `None` once the underlying channel is closed.
    async fn next(&mut self) -> Option<QuotaEvent>;
}

/// CRUD and listing operations over [`Account`] records.
#[async_trait]
pub trait Accounts: Send + Sync {
    /// Fetches one account by id, or `None` if it does not exist.
    async fn get(&self, account_id: &quotaguard_types::AccountId) -> Option<Account>;

    /// Inserts or replaces an account record.
    async fn set(&self, account: Account);

    /// Removes an account record, if present.
    async fn delete(&self, account_id: &quotaguard_types::AccountId);

    /// Lists every known account.
    async fn list(&self) -> Vec<Account>;

    /// Lists every account with `enabled = true`.
    async fn list_enabled(&self) -> Vec<Account>;

    /// Sets (or clears, with `None`) an account's `blocked_until` instant.
    async fn set_blocked_until(
        &self,
        account_id: &quotaguard_types::AccountId,
        until: Option<chrono::DateTime<chrono::Utc>>,
    );
}

/// CRUD operations over [`AccountCredentials`], owned exclusively by the Store.
#[async_trait]
pub trait Credentials: Send + Sync {
    /// Fetches credentials for an account, or `None` if none are on file.
    async fn get(&self, account_id: &quotaguard_types::AccountId) -> Option<AccountCredentials>;

    /// Inserts or replaces an account's credentials.
    async fn set(&self, credentials: AccountCredentials);

    /// Removes an account's credentials, if present.
    async fn delete(&self, account_id: &quotaguard_types::AccountId);
}

/// CRUD, update, and pub/sub operations over [`QuotaInfo`] snapshots.
#[async_trait]
pub trait Quotas: Send + Sync {
    /// Fetches the current snapshot for an account, or `None` if none has been collected yet.
    async fn get(&self, account_id: &quotaguard_types::AccountId) -> Option<QuotaInfo>;

    /// Replaces the current snapshot for an account, publishing a `QuotaEvent` to subscribers.
    async fn set(&self, quota: QuotaInfo);

    /// Applies `f` to the current snapshot (or a caller-seeded default) under the
    /// per-account lock, publishing a `QuotaEvent` if the resulting snapshot differs.
    async fn update(
        &self,
        account_id: &quotaguard_types::AccountId,
        f: Box<dyn FnOnce(Option<QuotaInfo>) -> QuotaInfo + Send>,
    );

    /// Removes the snapshot for an account, if present.
    async fn delete(&self, account_id: &quotaguard_types::AccountId);

    /// Lists every known current snapshot.
    async fn list(&self) -> Vec<QuotaInfo>;

    /// Subscribes to change events for a single account, created lazily on first call.
    async fn subscribe(
        &self,
        account_id: &quotaguard_types::AccountId,
    ) -> Box<dyn QuotaSubscription>;
}

/// CRUD operations over [`Reservation`] records.
#[async_trait]
pub trait Reservations: Send + Sync {
    /// Fetches a reservation by id, or `None` if it does not exist.
    async fn get(&self, reservation_id: &ReservationId) -> Option<Reservation>;

    /// Inserts or replaces a reservation record.
    async fn set(&self, reservation: Reservation);

    /// Removes a reservation record, if present.
    async fn delete(&self, reservation_id: &ReservationId);

    /// Lists every known reservation, including terminal ones not yet swept.
    async fn list(&self) -> Vec<Reservation>;
}

/// Typed get/set over the Store's small settings key-value namespace.
#[async_trait]
pub trait Settings: Send + Sync {
    /// Fetches a raw setting value, or `None` if the key is unset.
    async fn get(&self, key: &str) -> Option<SettingValue>;

    /// Sets a raw setting value.
    async fn set(&self, key: &str, value: SettingValue);

    /// Fetches a string setting, or `None` if unset or of a different type.
    async fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).await.and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Fetches an integer setting, or `None` if unset or of a different type.
    async fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).await.and_then(|v| v.as_int())
    }

    /// Fetches a float setting, or `None` if unset or of a different type.
    async fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).await.and_then(|v| v.as_float())
    }
}

/// The Store's full contract: persistence and pub/sub for every entity in
/// the data model, plus the settings namespace.
///
/// Single-writer semantics per key are guaranteed by implementations;
/// readers always see a consistent `QuotaInfo` (dimensions match the
/// derived scalar). Write failures are logged by implementations and never
/// panic; a read-miss simply returns `None`/empty.
#[async_trait]
pub trait Store: Accounts + Credentials + Quotas + Reservations + Settings + Send + Sync {
    /// Human-readable identity for logs (e.g. `"memory"`).
    fn name(&self) -> &'static str;
}

/// Convenience alias for a type-erased, shareable `Store`.
pub type SharedStore = std::sync::Arc<dyn Store>;
