use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quotaguard_core::{Accounts, Clock, QuotaGuardError, Quotas, SharedStore, SystemClock};
use quotaguard_reservation::ReservationManager;
use quotaguard_types::{Account, AccountId, ChainKey, CorrelationId, Provider, QuotaInfo, Reservation, RouterConfig, Weights};
use tokio::sync::RwLock as AsyncRwLock;

use crate::hysteresis::{decide, RouterState};
use crate::scoring::{passes_basic_gate, score_candidate, CandidateFacts, ScoreBreakdown};

/// Caller-supplied parameters for one routing decision.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Correlation id threaded through the resulting reservation.
    pub correlation_id: CorrelationId,
    /// Estimated cost, as a percentage of budget, reserved against the winner.
    pub estimated_cost_pct: f64,
    /// Named weight policy to use, or `None` for `config.default_policy`.
    pub policy: Option<String>,
    /// TTL applied to the resulting reservation, or `None` for the manager's default.
    pub ttl: Option<Duration>,
}

/// Successful outcome of a routing decision.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// Account selected for this request.
    pub account_id: AccountId,
    /// Reservation created against the selected account.
    pub reservation: Reservation,
    /// Per-component score breakdown behind the selection.
    pub score_breakdown: ScoreBreakdown,
    /// Human-readable reason for this specific decision.
    pub reason: &'static str,
}

/// Selects one candidate account per request, subject to thresholds,
/// hysteresis, and fallback chains, and issues a reservation for it.
pub struct Router {
    store: SharedStore,
    reservations: Arc<ReservationManager>,
    config: AsyncRwLock<RouterConfig>,
    state: std::sync::Mutex<RouterState>,
    reliability: std::sync::Mutex<HashMap<AccountId, f64>>,
    clock: Arc<dyn Clock>,
}

/// Exponential smoothing factor applied to the reliability tracker on each
/// recorded outcome; recent history dominates without forgetting instantly.
const RELIABILITY_EWMA_ALPHA: f64 = 0.2;

impl Router {
    /// Builds a Router over `store` and `reservations`, using the system clock.
    #[must_use]
    pub fn new(store: SharedStore, reservations: Arc<ReservationManager>, config: RouterConfig) -> Self {
        Self::with_clock(store, reservations, config, Arc::new(SystemClock))
    }

    /// Builds a Router with an injected `Clock`, for deterministic dwell/cooldown tests.
    #[must_use]
    pub fn with_clock(
        store: SharedStore,
        reservations: Arc<ReservationManager>,
        config: RouterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            reservations,
            config: AsyncRwLock::new(config),
            state: std::sync::Mutex::new(RouterState::default()),
            reliability: std::sync::Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Replaces the hot-reloadable configuration after normalising and
    /// validating thresholds; rejects and keeps the prior config if the
    /// supplied weights are degenerate (all zero or negative).
    pub async fn update_config(&self, mut new_config: RouterConfig) -> Result<bool, QuotaGuardError> {
        let weights_sum = new_config.weights.safety
            + new_config.weights.refill
            + new_config.weights.tier
            + new_config.weights.reliability
            + new_config.weights.cost;
        if weights_sum <= 0.0 {
            return Err(QuotaGuardError::ConfigInvalid(
                "router weight vector must sum to a positive value".to_owned(),
            ));
        }
        if new_config.min_safe < 0.0 || new_config.min_safe > 100.0 {
            return Err(QuotaGuardError::ConfigInvalid(
                "min_safe must be within [0, 100]".to_owned(),
            ));
        }
        let changed = new_config.normalize_thresholds();
        *self.config.write().await = new_config;
        Ok(changed)
    }

    /// Current configuration snapshot, for callers that need to inspect
    /// thresholds without going through a routing decision.
    pub async fn config_snapshot(&self) -> RouterConfig {
        self.config.read().await.clone()
    }

    /// Records a fetch outcome for `account_id`, feeding the reliability
    /// component of future scoring via an exponential moving average.
    pub fn record_outcome(&self, account_id: &AccountId, success: bool) {
        let mut reliability = self.reliability.lock().expect("reliability mutex poisoned");
        let current = reliability.entry(account_id.clone()).or_insert(1.0);
        let sample = if success { 1.0 } else { 0.0 };
        *current = *current * (1.0 - RELIABILITY_EWMA_ALPHA) + sample * RELIABILITY_EWMA_ALPHA;
    }

    fn reliability_for(&self, account_id: &AccountId) -> f64 {
        self.reliability
            .lock()
            .expect("reliability mutex poisoned")
            .get(account_id)
            .copied()
            .unwrap_or(1.0)
    }

    fn weights_for(&self, config: &RouterConfig, policy: Option<&str>) -> Weights {
        let policy_name = policy.unwrap_or(&config.default_policy);
        config.policies.get(policy_name).copied().unwrap_or(config.weights)
    }

    fn to_facts(&self, account: &Account, quota: &QuotaInfo) -> CandidateFacts {
        CandidateFacts {
            account_id: account.id.clone(),
            priority: account.priority,
            tier: quota.tier.clone(),
            cost_coefficient: account.cost_coefficient,
            effective_remaining_with_virtual: quota.effective_remaining_with_virtual(),
            seconds_until_nearest_reset: quota.seconds_until_nearest_reset(self.clock.now()),
            reliability: self.reliability_for(&account.id),
            source: quota.source,
        }
    }

    fn resolve_chain(&self, current_account: &Account, config: &RouterConfig) -> Vec<AccountId> {
        let mut chain = config
            .fallback_chains
            .get(&ChainKey::Account(current_account.id.clone()))
            .cloned()
            .unwrap_or_default();
        if let Some(provider_chain) = config.fallback_chains.get(&ChainKey::Provider(current_account.provider.clone())) {
            for id in provider_chain {
                if !chain.contains(id) {
                    chain.push(id.clone());
                }
            }
        }
        chain
    }

    async fn build_candidates(&self, config: &RouterConfig) -> (Vec<CandidateFacts>, bool) {
        let now = self.clock.now();
        let accounts = Accounts::list(&*self.store).await;
        let by_id: HashMap<AccountId, Account> = accounts.into_iter().map(|a| (a.id.clone(), a)).collect();

        let mut quotas = HashMap::new();
        for account_id in by_id.keys() {
            if let Some(quota) = Quotas::get(&*self.store, account_id).await {
                quotas.insert(account_id.clone(), quota);
            }
        }

        let basic: Vec<CandidateFacts> = by_id
            .values()
            .filter_map(|account| {
                let quota = quotas.get(&account.id)?;
                passes_basic_gate(account, quota, config, now, true).then(|| self.to_facts(account, quota))
            })
            .collect();
        if !basic.is_empty() {
            return (basic, false);
        }

        let current_selection = self.state.lock().expect("router state mutex poisoned").current_selection.clone();
        if let Some(current_id) = &current_selection {
            if let Some(current_account) = by_id.get(current_id) {
                let chain = self.resolve_chain(current_account, config);
                let chained: Vec<CandidateFacts> = chain
                    .iter()
                    .filter_map(|id| by_id.get(id))
                    .filter_map(|account| {
                        let quota = quotas.get(&account.id)?;
                        passes_basic_gate(account, quota, config, now, false).then(|| self.to_facts(account, quota))
                    })
                    .collect();
                if !chained.is_empty() {
                    return (chained, false);
                }
            }
        }

        let relaxed: Vec<CandidateFacts> = by_id
            .values()
            .filter_map(|account| {
                let quota = quotas.get(&account.id)?;
                passes_basic_gate(account, quota, config, now, false).then(|| self.to_facts(account, quota))
            })
            .collect();
        (relaxed, true)
    }

    /// Runs one routing decision: builds the candidate set, applies scoring
    /// and hysteresis, and issues a reservation for the winner.
    pub async fn route(&self, request: RouteRequest) -> Result<RouteDecision, QuotaGuardError> {
        let config = self.config.read().await.clone();
        let (candidates, relaxed) = self.build_candidates(&config).await;
        if candidates.is_empty() {
            return Err(QuotaGuardError::no_suitable_account(
                "no enabled, unblocked account has a known quota snapshot",
            ));
        }

        let weights = self.weights_for(&config, request.policy.as_deref());
        let max_cost = candidates.iter().map(|c| c.cost_coefficient).fold(0.0_f64, f64::max);
        let scored: Vec<(CandidateFacts, ScoreBreakdown)> = candidates
            .into_iter()
            .map(|facts| {
                let score = score_candidate(&facts, &weights, max_cost);
                (facts, score)
            })
            .collect();

        let now = self.clock.now();
        let decision = {
            let mut state = self.state.lock().expect("router state mutex poisoned");
            let decision = decide(&scored, &state, &config, now)
                .ok_or_else(|| QuotaGuardError::no_suitable_account("candidate set became empty mid-decision"))?;
            if decision.switched {
                state.current_selection = Some(decision.account_id.clone());
                state.last_switch_at = Some(now);
                state.dwell_start = Some(now);
            }
            decision
        };

        let reason = if relaxed {
            "drain-to-zero: all candidates were below min_safe"
        } else {
            decision.reason
        };

        let reservation = self
            .reservations
            .reserve(&decision.account_id, request.estimated_cost_pct, request.ttl, request.correlation_id)
            .await;

        Ok(RouteDecision {
            account_id: decision.account_id,
            reservation,
            score_breakdown: decision.score,
            reason,
        })
    }
}
