//! Configuration types consumed by the Router, Alert Service, Collectors, and Limiter.
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::account::Provider;
use crate::ids::AccountId;

/// Weight vector for the Router's per-candidate scoring function.
///
/// Components are normalised to `[0, 1]` before weighting; the default
/// favors safety while still letting tier/cost break near-ties.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    /// Weight on `effective_remaining_with_virtual / 100`.
    pub safety: f64,
    /// Weight on `1 / (1 + seconds_until_nearest_reset / 3600)`.
    pub refill: f64,
    /// Weight on normalised account tier rank.
    pub tier: f64,
    /// Weight on `1 - recent_error_rate`.
    pub reliability: f64,
    /// Weight on `1 - normalized_cost`.
    pub cost: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            safety: 0.35,
            refill: 0.15,
            tier: 0.15,
            reliability: 0.2,
            cost: 0.15,
        }
    }
}

/// Key into a fallback chain table: either a specific account or an entire provider.
///
/// Account-id entries always take precedence over provider entries for the
/// same current selection when both exist (see the Router's chain
/// resolution order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainKey {
    /// Chain keyed by a specific account id.
    Account(AccountId),
    /// Chain keyed by an entire provider.
    Provider(Provider),
}

/// Hot-reloadable Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Used-% at or above which an alerting-only warning signal is implied. Not enforced by the Router.
    pub warning: f64,
    /// Used-% at or above which an account is pushed out of the preferred pool.
    pub switch: f64,
    /// Used-% at or above which an account is marked critical.
    pub critical: f64,
    /// Minimum `effective_remaining_with_virtual` required for basic candidacy.
    pub min_safe: f64,
    /// Minimum time the Router must remain on its current selection before re-evaluating a switch.
    pub min_dwell_time: Duration,
    /// Minimum time that must elapse after a switch before another switch is allowed.
    pub cooldown_after_switch: Duration,
    /// Minimum score gap a challenger must clear to displace the incumbent.
    pub hysteresis_margin: f64,
    /// Scoring weight vector used when no per-policy override matches.
    pub weights: Weights,
    /// Name of the policy used when a request specifies none.
    pub default_policy: String,
    /// Named weight-vector overrides, selectable per request.
    pub policies: HashMap<String, Weights>,
    /// Ordered successor lists, consulted when the current selection is not a candidate.
    pub fallback_chains: HashMap<ChainKey, Vec<AccountId>>,
    /// When true, accounts whose current `QuotaInfo::source` is `Estimated` are excluded from candidacy.
    pub ignore_estimated: bool,
}

impl RouterConfig {
    /// Enforces `0 <= warning < switch < critical <= 100` by nudging violating
    /// fields into order, per the public control-surface invariant. Returns
    /// `true` if any field was changed, so callers can log a warning.
    pub fn normalize_thresholds(&mut self) -> bool {
        let mut changed = false;
        self.warning = self.warning.clamp(0.0, 100.0);
        self.critical = self.critical.clamp(0.0, 100.0);
        if !(self.warning < self.switch) {
            self.switch = (self.warning + 1.0).min(100.0);
            changed = true;
        }
        if !(self.switch < self.critical) {
            self.critical = (self.switch + 1.0).min(100.0);
            changed = true;
        }
        changed
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            warning: 70.0,
            switch: 85.0,
            critical: 95.0,
            min_safe: 10.0,
            min_dwell_time: Duration::from_secs(30),
            cooldown_after_switch: Duration::from_secs(60),
            hysteresis_margin: 0.05,
            weights: Weights::default(),
            default_policy: "default".to_owned(),
            policies: HashMap::new(),
            fallback_chains: HashMap::new(),
            ignore_estimated: false,
        }
    }
}

/// Per-account concurrency admission configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Poll interval used by `Waiter::acquire` while busy-waiting for a free slot.
    pub waiter_poll_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            waiter_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Passive ingestion (Collector §4.3) configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PassiveCollectorConfig {
    /// Bounded ingest queue capacity; `ingest` fails with `QueueFull` once exceeded.
    pub queue_capacity: usize,
    /// How often the flusher drains buffered snapshots to the store.
    pub flush_period: Duration,
    /// Maximum snapshots drained per flush tick.
    pub flush_batch_max: usize,
}

impl Default for PassiveCollectorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            flush_period: Duration::from_secs(2),
            flush_batch_max: 256,
        }
    }
}

/// Active polling (Collector §4.4) configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActiveCollectorConfig {
    /// Base polling interval before adaptive scaling is applied.
    pub base_interval: Duration,
    /// Whether the adaptive-interval multiplier is applied at all.
    pub adaptive_interval_enabled: bool,
    /// Additional retry attempts beyond the first, per account per cycle.
    pub retry_attempts: u32,
    /// Backoff unit; the `n`th retry waits `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Per-attempt fetch timeout.
    pub fetch_timeout: Duration,
    /// Maximum accounts fetched concurrently within one poll cycle.
    pub max_parallel_fetches: usize,
    /// Upper bound of the optional random jitter applied before each fetch starts.
    pub jitter: Duration,
    /// Consecutive failures required to trip the breaker from `Closed` to `Open`.
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays `Open` before allowing a `HalfOpen` probe.
    pub breaker_timeout: Duration,
}

impl Default for ActiveCollectorConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            adaptive_interval_enabled: true,
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(10),
            max_parallel_fetches: 8,
            jitter: Duration::from_millis(250),
            breaker_failure_threshold: 3,
            breaker_timeout: Duration::from_secs(30),
        }
    }
}

/// Reservation Manager configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// TTL applied to a reservation when the caller does not specify one.
    pub default_ttl: Duration,
    /// How often the sweeper scans for reservations past `expires_at`.
    pub cleanup_interval: Duration,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(15),
        }
    }
}

/// Store configuration: retention and pub/sub buffering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long a `QuotaInfo` snapshot is retained after it is superseded.
    pub quota_retention: Duration,
    /// How long a terminal-status reservation is retained.
    pub reservation_retention: Duration,
    /// How often the cleanup task sweeps expired records.
    pub cleanup_interval: Duration,
    /// Per-account broadcast channel buffer size for `Subscribe`.
    pub subscriber_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            quota_retention: Duration::from_secs(24 * 3600),
            reservation_retention: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            subscriber_buffer: 32,
        }
    }
}

/// Alert Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Token-bucket refill rate and capacity, in alerts per minute.
    pub rate_per_minute: u32,
    /// Window within which identical `(account, type, severity)` alerts collapse into one delivery.
    pub dedup_window: Duration,
    /// Grace period given to in-flight deliveries during `Stop`.
    pub shutdown_timeout: Duration,
    /// Bounded queue capacity for alerts pending a throttle-bucket token.
    pub pending_queue_capacity: usize,
    /// How often the threshold evaluator runs.
    pub evaluation_interval: Duration,
    /// How often the dedup map is swept of expired records.
    pub dedup_sweep_interval: Duration,
    /// Default mute duration when none is specified by the caller.
    pub mute_default_duration: Duration,
    /// Digest fire time, `HH:MM` 24-hour; invalid values fall back to `09:00`.
    pub digest_time: String,
    /// IANA timezone name the digest time is anchored to; invalid values fall back to UTC.
    pub digest_timezone: String,
    /// Timeout applied to a single digest delivery attempt.
    pub digest_send_timeout: Duration,
    /// Ascending `usedPct` thresholds the evaluator checks; the highest one
    /// exceeded wins. Severity is `critical` only at the last (maximum) entry.
    pub alert_thresholds: Vec<f64>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            rate_per_minute: 30,
            dedup_window: Duration::from_secs(30 * 60),
            shutdown_timeout: Duration::from_secs(25),
            pending_queue_capacity: 256,
            evaluation_interval: Duration::from_secs(60),
            dedup_sweep_interval: Duration::from_secs(10 * 60),
            mute_default_duration: Duration::from_secs(15 * 60),
            digest_time: "09:00".to_owned(),
            digest_timezone: "UTC".to_owned(),
            digest_send_timeout: Duration::from_secs(10),
            alert_thresholds: vec![85.0, 95.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_thresholds_accepts_valid_order() {
        let mut cfg = RouterConfig {
            warning: 10.0,
            switch: 50.0,
            critical: 90.0,
            ..RouterConfig::default()
        };
        assert!(!cfg.normalize_thresholds());
        assert!((cfg.warning - 10.0).abs() < 1e-9);
        assert!((cfg.switch - 50.0).abs() < 1e-9);
        assert!((cfg.critical - 90.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_thresholds_nudges_violations_into_order() {
        let mut cfg = RouterConfig {
            warning: 50.0,
            switch: 40.0,
            critical: 45.0,
            ..RouterConfig::default()
        };
        assert!(cfg.normalize_thresholds());
        assert!(cfg.warning < cfg.switch);
        assert!(cfg.switch < cfg.critical);
    }
}
