/// A typed value in the Store's small settings key-value namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// A string-valued setting (e.g. digest timezone).
    String(String),
    /// An integer-valued setting (e.g. account-check interval seconds).
    Int(i64),
    /// A floating point setting (e.g. a threshold percentage).
    Float(f64),
}

impl SettingValue {
    /// Returns the inner string, if this is a `String` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Int(_) | Self::Float(_) => None,
        }
    }

    /// Returns the inner integer, if this is an `Int` value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::String(_) | Self::Float(_) => None,
        }
    }

    /// Returns the inner float, if this is a `Float` value.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::String(_) | Self::Int(_) => None,
        }
    }
}

/// Well-known keys in the Store's settings namespace, consumed by the
/// Router and Alert Service and writable at hot-reload.
pub mod setting_keys {
    /// `Float` — Router warning threshold (used %).
    pub const ROUTER_WARNING: &str = "router.threshold.warning";
    /// `Float` — Router switch threshold (used %).
    pub const ROUTER_SWITCH: &str = "router.threshold.switch";
    /// `Float` — Router critical threshold (used %).
    pub const ROUTER_CRITICAL: &str = "router.threshold.critical";
    /// `Float` — Router minimum-safe threshold (used %).
    pub const ROUTER_MIN_SAFE: &str = "router.threshold.min_safe";
    /// `Int` — Router minimum dwell time, in milliseconds.
    pub const ROUTER_MIN_DWELL_MS: &str = "router.min_dwell_ms";
    /// `Int` — Router cooldown after a switch, in milliseconds.
    pub const ROUTER_COOLDOWN_MS: &str = "router.cooldown_ms";
    /// `Float` — Router hysteresis margin.
    pub const ROUTER_HYSTERESIS_MARGIN: &str = "router.hysteresis_margin";
    /// `String` — serialized routing policy / fallback chains.
    pub const ROUTER_FALLBACK_CHAINS: &str = "router.fallback_chains";
    /// `Int` — mute duration, in milliseconds.
    pub const ALERTS_MUTE_DURATION_MS: &str = "alerts.mute_duration_ms";
    /// `Int` — active-collector account-check interval, in milliseconds.
    pub const COLLECTOR_CHECK_INTERVAL_MS: &str = "collector.check_interval_ms";
    /// `Int` — active-collector per-fetch timeout, in milliseconds.
    pub const COLLECTOR_FETCH_TIMEOUT_MS: &str = "collector.fetch_timeout_ms";
    /// `String` — digest fire time, `HH:MM` 24-hour.
    pub const ALERTS_DIGEST_TIME: &str = "alerts.digest_time";
    /// `String` — digest IANA timezone name.
    pub const ALERTS_DIGEST_TIMEZONE: &str = "alerts.digest_timezone";
}
