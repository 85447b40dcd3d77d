//! quotaguard-reservation
//!
//! Lease-based soft holds against future account usage: `Reserve`/`Commit`/
//! `Cancel`, plus a background sweeper that expires stale active leases.
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quotaguard_core::{Clock, QuotaGuardError, SharedStore, SystemClock};
use quotaguard_types::{
    AccountId, CorrelationId, Reservation, ReservationConfig, ReservationId, ReservationStatus,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Per-account bookkeeping: the set of currently active reservation costs
/// and their sum, kept behind one lock so the two never observably diverge.
///
/// This is the Design Notes' "single per-account lock covering (quota
/// snapshot, active reservation set)" guidance; the quota snapshot itself
/// still lives in the `Store`, mirrored here via `Quotas::update` inside the
/// same operation that mutates `active`.
#[derive(Debug, Default, Clone)]
struct AccountReservationState {
    active: HashMap<ReservationId, f64>,
    virtual_used_pct: f64,
}

/// Manages short-lived, soft claims against accounts' future usage.
pub struct ReservationManager {
    states: RwLock<HashMap<AccountId, AccountReservationState>>,
    store: SharedStore,
    config: ReservationConfig,
    clock: Arc<dyn Clock>,
    id_counter: AtomicU64,
}

impl ReservationManager {
    /// Builds a reservation manager backed by `store`, using the system clock.
    #[must_use]
    pub fn new(store: SharedStore, config: ReservationConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Builds a reservation manager with an injected `Clock`, for
    /// deterministic sweeper/TTL tests.
    #[must_use]
    pub fn with_clock(store: SharedStore, config: ReservationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            store,
            config,
            clock,
            id_counter: AtomicU64::new(0),
        }
    }

    fn next_reservation_id(&self, account_id: &AccountId) -> ReservationId {
        let seq = self.id_counter.fetch_add(1, Ordering::Relaxed);
        ReservationId::new(format!("{account_id}-{seq}-{}", self.clock.now().timestamp_nanos_opt().unwrap_or_default()))
    }

    async fn mirror_virtual_used(&self, account_id: &AccountId, virtual_used_pct: f64) {
        let account_id = account_id.clone();
        quotaguard_core::Quotas::update(
            &*self.store,
            &account_id,
            Box::new(move |existing| {
                let mut quota = existing.expect("quota must exist to mirror virtual usage onto it");
                quota.virtual_used_pct = virtual_used_pct;
                quota
            }),
        )
        .await;
    }

    async fn mirror_virtual_used_if_present(&self, account_id: &AccountId, virtual_used_pct: f64) {
        if quotaguard_core::Quotas::get(&*self.store, account_id).await.is_some() {
            self.mirror_virtual_used(account_id, virtual_used_pct).await;
        }
    }

    /// Creates an active reservation for `account_id`, incrementing its
    /// `virtualUsedPct` by `estimated_cost_pct`.
    pub async fn reserve(
        &self,
        account_id: &AccountId,
        estimated_cost_pct: f64,
        ttl: Option<std::time::Duration>,
        correlation_id: CorrelationId,
    ) -> Reservation {
        let id = self.next_reservation_id(account_id);
        let created_at = self.clock.now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let expires_at = created_at + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());

        let virtual_used_pct = {
            let mut states = self.states.write().await;
            let state = states.entry(account_id.clone()).or_default();
            state.active.insert(id.clone(), estimated_cost_pct);
            state.virtual_used_pct = (state.virtual_used_pct + estimated_cost_pct).max(0.0);
            state.virtual_used_pct
        };
        self.mirror_virtual_used_if_present(account_id, virtual_used_pct).await;

        let reservation = Reservation {
            id,
            account_id: account_id.clone(),
            correlation_id,
            estimated_cost_pct,
            actual_cost_pct: None,
            status: ReservationStatus::Active,
            created_at,
            expires_at,
            released_at: None,
        };
        quotaguard_core::Reservations::set(&*self.store, reservation.clone()).await;
        reservation
    }

    async fn release_active(&self, account_id: &AccountId, reservation_id: &ReservationId) -> bool {
        let virtual_used_pct = {
            let mut states = self.states.write().await;
            let Some(state) = states.get_mut(account_id) else {
                return false;
            };
            let Some(prev_cost) = state.active.remove(reservation_id) else {
                return false;
            };
            state.virtual_used_pct = (state.virtual_used_pct - prev_cost).max(0.0);
            state.virtual_used_pct
        };
        self.mirror_virtual_used_if_present(account_id, virtual_used_pct).await;
        true
    }

    /// Transitions an active reservation to `Released`, recording the
    /// actual cost and decrementing `virtualUsedPct` by the originally
    /// reserved amount.
    pub async fn commit(
        &self,
        reservation_id: &ReservationId,
        actual_cost_pct: f64,
    ) -> Result<(), QuotaGuardError> {
        let mut reservation = quotaguard_core::Reservations::get(&*self.store, reservation_id)
            .await
            .ok_or_else(|| QuotaGuardError::ReservationNotActive {
                reservation_id: reservation_id.to_string(),
            })?;
        if reservation.status != ReservationStatus::Active {
            return Err(QuotaGuardError::ReservationNotActive {
                reservation_id: reservation_id.to_string(),
            });
        }
        self.release_active(&reservation.account_id, reservation_id).await;
        reservation.status = ReservationStatus::Released;
        reservation.actual_cost_pct = Some(actual_cost_pct);
        reservation.released_at = Some(self.clock.now());
        quotaguard_core::Reservations::set(&*self.store, reservation).await;
        Ok(())
    }

    /// Transitions an active reservation to `Cancelled`, decrementing
    /// `virtualUsedPct` by the originally reserved amount.
    pub async fn cancel(&self, reservation_id: &ReservationId) -> Result<(), QuotaGuardError> {
        let mut reservation = quotaguard_core::Reservations::get(&*self.store, reservation_id)
            .await
            .ok_or_else(|| QuotaGuardError::ReservationNotActive {
                reservation_id: reservation_id.to_string(),
            })?;
        if reservation.status != ReservationStatus::Active {
            return Err(QuotaGuardError::ReservationNotActive {
                reservation_id: reservation_id.to_string(),
            });
        }
        self.release_active(&reservation.account_id, reservation_id).await;
        reservation.status = ReservationStatus::Cancelled;
        reservation.released_at = Some(self.clock.now());
        quotaguard_core::Reservations::set(&*self.store, reservation).await;
        Ok(())
    }

    /// Current `virtualUsedPct` for `account_id`, for diagnostics/tests.
    pub async fn virtual_used_pct(&self, account_id: &AccountId) -> f64 {
        self.states
            .read()
            .await
            .get(account_id)
            .map_or(0.0, |s| s.virtual_used_pct)
    }

    async fn sweep_expired(&self) {
        let now = self.clock.now();
        let reservations = quotaguard_core::Reservations::list(&*self.store).await;
        for reservation in reservations {
            if reservation.status != ReservationStatus::Active || reservation.expires_at > now {
                continue;
            }
            let mut expired = reservation.clone();
            self.release_active(&expired.account_id, &expired.id).await;
            expired.status = ReservationStatus::Expired;
            expired.released_at = Some(now);
            quotaguard_core::Reservations::set(&*self.store, expired).await;
        }
    }

    /// Spawns the background sweeper that expires active reservations past
    /// `expires_at` on each `cleanup_interval` tick.
    pub fn spawn_sweeper(self: Arc<Self>) -> SweeperHandle {
        let manager = Arc::clone(&self);
        let interval = self.config.cleanup_interval;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    () = manager.clock.sleep(interval) => {
                        manager.sweep_expired().await;
                    }
                }
            }
        });
        SweeperHandle { inner: Some(handle), token }
    }
}

/// Handle to the reservation sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    inner: Option<tokio::task::JoinHandle<()>>,
    token: CancellationToken,
}

impl SweeperHandle {
    /// Requests cooperative shutdown and awaits the sweeper's completion.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            let _ = inner.await;
        }
    }
}

impl Drop for SweeperHandle {
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
    use quotaguard_store::MemoryStore;
    use quotaguard_types::StoreConfig;

    fn manager() -> ReservationManager {
        let store: SharedStore = Arc::new(MemoryStore::new(StoreConfig::default()));
        ReservationManager::new(store, ReservationConfig::default())
    }

    #[tokio::test]
    async fn reserve_then_cancel_returns_virtual_used_to_zero() {
        let mgr = manager();
        let account = AccountId::new("a1");
        let reservation = mgr
            .reserve(&account, 5.0, None, CorrelationId::new("c1"))
            .await;
        assert!((mgr.virtual_used_pct(&account).await - 5.0).abs() < 1e-9);
        mgr.cancel(&reservation.id).await.unwrap();
        assert!((mgr.virtual_used_pct(&account).await - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn two_reservations_commit_and_cancel_leave_zero_virtual_used() {
        let mgr = manager();
        let account = AccountId::new("a1");
        let r1 = mgr.reserve(&account, 5.0, None, CorrelationId::new("c1")).await;
        let r2 = mgr.reserve(&account, 5.0, None, CorrelationId::new("c2")).await;
        assert!((mgr.virtual_used_pct(&account).await - 10.0).abs() < 1e-9);
        mgr.commit(&r1.id, 3.0).await.unwrap();
        mgr.cancel(&r2.id).await.unwrap();
        assert!((mgr.virtual_used_pct(&account).await - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sweeper_expires_reservations_past_ttl() {
        let store: SharedStore = Arc::new(MemoryStore::new(StoreConfig::default()));
        let mut config = ReservationConfig::default();
        config.default_ttl = std::time::Duration::from_millis(10);
        config.cleanup_interval = std::time::Duration::from_millis(10);
        let mgr = Arc::new(ReservationManager::new(store, config));
        let account = AccountId::new("a1");
        let reservation = mgr
            .reserve(&account, 5.0, None, CorrelationId::new("c1"))
            .await;
        let handle = Arc::clone(&mgr).spawn_sweeper();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        handle.stop().await;
        assert!((mgr.virtual_used_pct(&account).await - 0.0).abs() < 1e-9);
        let stored = quotaguard_core::Reservations::get(&*mgr.store, &reservation.id)
            .await
            .unwrap();
        assert_eq!(stored.status, ReservationStatus::Expired);
    }

    #[tokio::test]
    async fn double_commit_is_rejected() {
        let mgr = manager();
        let account = AccountId::new("a1");
        let reservation = mgr.reserve(&account, 5.0, None, CorrelationId::new("c1")).await;
        mgr.commit(&reservation.id, 2.0).await.unwrap();
        let result = mgr.commit(&reservation.id, 2.0).await;
        assert!(result.is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(f64),
        ResolveFirstActive { commit: bool, actual: f64 },
    }

    fn op_strategy() -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::prelude::*;
        prop_oneof![
            (0.0..20.0f64).prop_map(Op::Reserve),
            (proptest::bool::ANY, 0.0..20.0f64).prop_map(|(commit, actual)| Op::ResolveFirstActive { commit, actual }),
        ]
    }

    proptest::proptest! {
        /// After any sequence of reserve/commit/cancel calls, `virtual_used_pct`
        /// always equals the sum of estimated costs still active, never drifting
        /// from it regardless of interleaving or which reservation is resolved.
        #[test]
        fn virtual_used_pct_matches_sum_of_active_reservations(ops in proptest::collection::vec(op_strategy(), 1..50)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let mgr = manager();
                let account = AccountId::new("a1");
                let mut active: Vec<ReservationId> = Vec::new();
                let mut expected = 0.0f64;

                for op in ops {
                    match op {
                        Op::Reserve(cost) => {
                            let reservation = mgr.reserve(&account, cost, None, CorrelationId::new("c")).await;
                            active.push(reservation.id);
                            expected += cost;
                        }
                        Op::ResolveFirstActive { commit, actual } => {
                            if active.is_empty() {
                                continue;
                            }
                            let id = active.remove(0);
                            let prior_cost = {
                                let states = mgr.states.read().await;
                                states.get(&account).and_then(|s| s.active.get(&id).copied()).unwrap_or(0.0)
                            };
                            if commit {
                                mgr.commit(&id, actual).await.unwrap();
                            } else {
                                mgr.cancel(&id).await.unwrap();
                            }
                            expected -= prior_cost;
                        }
                    }
                    let observed = mgr.virtual_used_pct(&account).await;
                    prop_assert!((observed - expected).abs() < 1e-6, "observed {observed} expected {expected}");
                }
                Ok(())
            })?;
        }
    }
}
