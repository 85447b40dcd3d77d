use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// Severity of an emitted alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Severity {
    /// Crossed `warning` but not yet `critical`.
    Warning,
    /// Crossed `critical`, or the account is exhausted.
    Critical,
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// What an evaluator cycle found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AlertType {
    /// `used_pct` crossed a configured threshold.
    Threshold {
        /// The highest configured threshold that was exceeded.
        threshold: f64,
    },
    /// A dimension with a known limit has been fully consumed.
    Exhausted,
}

impl core::fmt::Display for AlertType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Threshold { .. } => f.write_str("threshold"),
            Self::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// Dedup identity for an alert: `accountId | alertType | severity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Account the alert concerns.
    pub account_id: AccountId,
    /// Kind of alert, compared by discriminant only (not by threshold value).
    pub alert_type: &'static str,
    /// Severity of the alert.
    pub severity: Severity,
}

impl DedupKey {
    /// Builds a dedup key from an account id, alert type, and severity.
    #[must_use]
    pub fn new(account_id: AccountId, alert_type: &AlertType, severity: Severity) -> Self {
        let alert_type = match alert_type {
            AlertType::Threshold { .. } => "threshold",
            AlertType::Exhausted => "exhausted",
        };
        Self {
            account_id,
            alert_type,
            severity,
        }
    }
}

impl core::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}|{}|{}", self.account_id, self.alert_type, self.severity)
    }
}

/// Dedup bookkeeping for one [`DedupKey`]; purely a count/timestamp window,
/// never surfaced to callers.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    /// Canonical textual form of the dedup key this record tracks.
    pub key: String,
    /// Last time an alert matching `key` was observed (delivered or suppressed).
    pub sent_at: DateTime<Utc>,
    /// Number of times an alert matching `key` has been observed in the current window.
    pub count: u64,
}

/// Global mute gate for the Alert Service.
#[derive(Debug, Clone)]
pub struct MuteState {
    /// Whether muting is currently engaged.
    pub muted: bool,
    /// Instant the mute auto-clears.
    pub until: DateTime<Utc>,
    /// Operator-supplied reason, surfaced in logs and the digest.
    pub reason: String,
}

impl MuteState {
    /// True while `muted` is set and `now` has not yet reached `until`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.muted && now < self.until
    }

    /// Remaining mute duration, or `None` if not currently active.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.is_active(now).then(|| self.until - now)
    }
}
