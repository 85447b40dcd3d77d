//! Typed configuration aggregation and the `RawConfig -> Settings` loading path.
//!
//! File I/O and CLI argument parsing are out of scope; this module only
//! describes how a caller-supplied [`RawConfig`] (e.g. deserialized from a
//! YAML file elsewhere) is turned into the typed [`Settings`] every
//! component in the workspace actually consumes.
use std::time::Duration;

use quotaguard_types::{
    ActiveCollectorConfig, AlertConfig, LimiterConfig, PassiveCollectorConfig, ReservationConfig, RouterConfig, StoreConfig,
};
use serde::Deserialize;

/// One typed config struct per component, defaulted the way each crate's
/// own `Default` impl specifies. This is the bundle a [`crate::QuotaGuardBuilder`]
/// consumes; nothing here is specific to any one deployment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Store retention/pub-sub configuration.
    pub store: StoreConfig,
    /// Per-account concurrency admission configuration.
    pub limiter: LimiterConfig,
    /// Passive ingestion configuration.
    pub passive: PassiveCollectorConfig,
    /// Active polling configuration.
    pub active: ActiveCollectorConfig,
    /// Reservation Manager configuration.
    pub reservation: ReservationConfig,
    /// Router configuration.
    pub router: RouterConfig,
    /// Alert Service configuration.
    pub alert: AlertConfig,
}

/// Sparse, all-optional mirror of [`Settings`]'s commonly tuned knobs,
/// suitable for deserializing from an external config file (YAML, TOML,
/// whatever the deployment's loader produces). Fields left `None` fall back
/// to the corresponding component's `Default`.
///
/// Only the knobs an operator is realistically expected to tune at
/// deployment time are exposed here; anything more esoteric (named weight
/// policies, fallback chains, header adapters) is wired programmatically
/// through [`crate::QuotaGuardBuilder`] instead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    /// Overrides [`RouterConfig::warning`].
    pub router_warning_pct: Option<f64>,
    /// Overrides [`RouterConfig::switch`].
    pub router_switch_pct: Option<f64>,
    /// Overrides [`RouterConfig::critical`].
    pub router_critical_pct: Option<f64>,
    /// Overrides [`RouterConfig::min_safe`].
    pub router_min_safe_pct: Option<f64>,
    /// Overrides [`RouterConfig::hysteresis_margin`].
    pub router_hysteresis_margin: Option<f64>,
    /// Overrides [`RouterConfig::min_dwell_time`], in seconds.
    pub router_min_dwell_secs: Option<u64>,
    /// Overrides [`RouterConfig::cooldown_after_switch`], in seconds.
    pub router_cooldown_secs: Option<u64>,

    /// Overrides [`AlertConfig::rate_per_minute`].
    pub alert_rate_per_minute: Option<u32>,
    /// Overrides [`AlertConfig::dedup_window`], in seconds.
    pub alert_dedup_window_secs: Option<u64>,
    /// Overrides [`AlertConfig::alert_thresholds`].
    pub alert_thresholds: Option<Vec<f64>>,
    /// Overrides [`AlertConfig::digest_time`].
    pub alert_digest_time: Option<String>,
    /// Overrides [`AlertConfig::digest_timezone`].
    pub alert_digest_timezone: Option<String>,

    /// Overrides [`ActiveCollectorConfig::base_interval`], in seconds.
    pub active_base_interval_secs: Option<u64>,
    /// Overrides [`ActiveCollectorConfig::adaptive_interval_enabled`].
    pub active_adaptive_interval_enabled: Option<bool>,
    /// Overrides [`ActiveCollectorConfig::max_parallel_fetches`].
    pub active_max_parallel_fetches: Option<usize>,
    /// Overrides [`ActiveCollectorConfig::breaker_failure_threshold`].
    pub active_breaker_failure_threshold: Option<u32>,
    /// Overrides [`ActiveCollectorConfig::breaker_timeout`], in seconds.
    pub active_breaker_timeout_secs: Option<u64>,

    /// Overrides [`PassiveCollectorConfig::queue_capacity`].
    pub passive_queue_capacity: Option<usize>,
    /// Overrides [`PassiveCollectorConfig::flush_period`], in seconds.
    pub passive_flush_period_secs: Option<u64>,

    /// Overrides [`LimiterConfig::waiter_poll_interval`], in milliseconds.
    pub limiter_waiter_poll_interval_ms: Option<u64>,

    /// Overrides [`ReservationConfig::default_ttl`], in seconds.
    pub reservation_default_ttl_secs: Option<u64>,
    /// Overrides [`ReservationConfig::cleanup_interval`], in seconds.
    pub reservation_cleanup_interval_secs: Option<u64>,

    /// Overrides [`StoreConfig::quota_retention`], in seconds.
    pub store_quota_retention_secs: Option<u64>,
}

impl RawConfig {
    /// Applies every set override onto component defaults, producing a
    /// fully typed [`Settings`]. Unset fields keep each component's own
    /// `Default`, so a `RawConfig::default()` round-trips to
    /// `Settings::default()`.
    #[must_use]
    pub fn into_settings(self) -> Settings {
        let mut settings = Settings::default();

        if let Some(v) = self.router_warning_pct {
            settings.router.warning = v;
        }
        if let Some(v) = self.router_switch_pct {
            settings.router.switch = v;
        }
        if let Some(v) = self.router_critical_pct {
            settings.router.critical = v;
        }
        if let Some(v) = self.router_min_safe_pct {
            settings.router.min_safe = v;
        }
        if let Some(v) = self.router_hysteresis_margin {
            settings.router.hysteresis_margin = v;
        }
        if let Some(v) = self.router_min_dwell_secs {
            settings.router.min_dwell_time = Duration::from_secs(v);
        }
        if let Some(v) = self.router_cooldown_secs {
            settings.router.cooldown_after_switch = Duration::from_secs(v);
        }
        settings.router.normalize_thresholds();

        if let Some(v) = self.alert_rate_per_minute {
            settings.alert.rate_per_minute = v;
        }
        if let Some(v) = self.alert_dedup_window_secs {
            settings.alert.dedup_window = Duration::from_secs(v);
        }
        if let Some(v) = self.alert_thresholds {
            settings.alert.alert_thresholds = v;
        }
        if let Some(v) = self.alert_digest_time {
            settings.alert.digest_time = v;
        }
        if let Some(v) = self.alert_digest_timezone {
            settings.alert.digest_timezone = v;
        }

        if let Some(v) = self.active_base_interval_secs {
            settings.active.base_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.active_adaptive_interval_enabled {
            settings.active.adaptive_interval_enabled = v;
        }
        if let Some(v) = self.active_max_parallel_fetches {
            settings.active.max_parallel_fetches = v;
        }
        if let Some(v) = self.active_breaker_failure_threshold {
            settings.active.breaker_failure_threshold = v;
        }
        if let Some(v) = self.active_breaker_timeout_secs {
            settings.active.breaker_timeout = Duration::from_secs(v);
        }

        if let Some(v) = self.passive_queue_capacity {
            settings.passive.queue_capacity = v;
        }
        if let Some(v) = self.passive_flush_period_secs {
            settings.passive.flush_period = Duration::from_secs(v);
        }

        if let Some(v) = self.limiter_waiter_poll_interval_ms {
            settings.limiter.waiter_poll_interval = Duration::from_millis(v);
        }

        if let Some(v) = self.reservation_default_ttl_secs {
            settings.reservation.default_ttl = Duration::from_secs(v);
        }
        if let Some(v) = self.reservation_cleanup_interval_secs {
            settings.reservation.cleanup_interval = Duration::from_secs(v);
        }

        if let Some(v) = self.store_quota_retention_secs {
            settings.store.quota_retention = Duration::from_secs(v);
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_raw_config_round_trips_to_default_settings() {
        let settings = RawConfig::default().into_settings();
        assert!((settings.router.warning - RouterConfig::default().warning).abs() < 1e-9);
        assert_eq!(settings.alert.alert_thresholds, AlertConfig::default().alert_thresholds);
    }

    #[test]
    fn overrides_apply_and_invalid_thresholds_are_normalized() {
        let raw = RawConfig {
            router_warning_pct: Some(90.0),
            router_switch_pct: Some(50.0),
            router_critical_pct: Some(60.0),
            alert_rate_per_minute: Some(5),
            ..RawConfig::default()
        };
        let settings = raw.into_settings();
        assert!((settings.router.warning - 90.0).abs() < 1e-9);
        assert!(settings.router.warning < settings.router.switch);
        assert!(settings.router.switch < settings.router.critical);
        assert_eq!(settings.alert.rate_per_minute, 5);
    }
}
