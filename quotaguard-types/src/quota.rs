use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Provider;
use crate::ids::AccountId;

/// One axis of a quota (e.g. requests, tokens, subscription credits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DimensionType {
    /// Request-count budget.
    Requests,
    /// Token-count budget.
    Tokens,
    /// Provider-native subscription credit budget.
    SubscriptionCredits,
    /// Any dimension not covered by the named variants.
    Other(String),
}

/// Reset-window behavior of a [`Dimension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WindowSemantics {
    /// Resets fully at a fixed instant.
    Fixed,
    /// Rolls continuously; `reset_at` marks when the oldest usage ages out.
    Sliding,
    /// Window behavior could not be determined from the source signal.
    #[default]
    Unknown,
}

/// Provenance of a [`Dimension`] or [`QuotaInfo`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum QuotaSource {
    /// Obtained by the active collector's provider fetcher.
    Polling,
    /// Obtained from a caller-submitted header snapshot.
    Passive,
    /// No authoritative limit was available; derived/guessed.
    #[default]
    Estimated,
}

/// A single quota axis for an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    /// Which axis this dimension measures.
    pub dimension_type: DimensionType,
    /// Total budget for the current window; `0` means unknown.
    pub limit: i64,
    /// Units consumed so far in the current window.
    pub used: i64,
    /// Units left in the current window (`limit - used`, clamped at the source).
    pub remaining: i64,
    /// When the window is known to reset.
    pub reset_at: Option<DateTime<Utc>>,
    /// Reset-window behavior, if known.
    pub window_semantics: WindowSemantics,
    /// Where this measurement came from.
    pub source: QuotaSource,
    /// Confidence in `[0, 1]` that this measurement is accurate.
    pub confidence: f64,
}

impl Dimension {
    /// True if this dimension has a known limit and zero or negative remaining budget.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.limit > 0 && self.remaining <= 0
    }

    /// Fractional remaining share in `[0, 100]`, or `None` if the limit is unknown.
    #[must_use]
    pub fn remaining_pct(&self) -> Option<f64> {
        if self.limit > 0 {
            Some((self.remaining as f64 / self.limit as f64 * 100.0).clamp(0.0, 100.0))
        } else {
            None
        }
    }
}

/// Derives `effective_remaining_pct` and whether the result rests on any
/// dimension with a known limit, per the QuotaInfo derivation rule: the
/// tightest known-limit dimension's remaining share, or (if none is known)
/// `0.0` paired with `false` so the caller can force `estimated`/low
/// confidence on the enclosing snapshot.
#[must_use]
pub fn derive_effective_remaining_pct(dimensions: &[Dimension]) -> (f64, bool) {
    let mut tightest: Option<f64> = None;
    for dim in dimensions {
        if let Some(pct) = dim.remaining_pct() {
            tightest = Some(tightest.map_or(pct, |current: f64| current.min(pct)));
        }
    }
    match tightest {
        Some(pct) => (pct, true),
        None => (0.0, false),
    }
}

/// Per-account quota snapshot as observed by the Collector and consumed by the Router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// Account this snapshot describes.
    pub account_id: AccountId,
    /// Upstream provider, duplicated from the account for convenient filtering.
    pub provider: Provider,
    /// Provider-reported tier at the time of collection.
    pub tier: String,
    /// Ordered dimensions backing `effective_remaining_pct`.
    pub dimensions: Vec<Dimension>,
    /// `min` over dimensions of `remaining / limit * 100` for known-limit dimensions.
    pub effective_remaining_pct: f64,
    /// Sum of active reservation costs against this account, in `[0, 100]`.
    pub virtual_used_pct: f64,
    /// Whether the provider is actively throttling this account right now.
    pub is_throttled: bool,
    /// Provenance of this snapshot as a whole.
    pub source: QuotaSource,
    /// Confidence in `[0, 1]` that this snapshot is accurate.
    pub confidence: f64,
    /// When this snapshot was collected.
    pub collected_at: DateTime<Utc>,
}

impl QuotaInfo {
    /// `effective_remaining_pct` less outstanding virtual usage, floored at zero.
    #[must_use]
    pub fn effective_remaining_with_virtual(&self) -> f64 {
        (self.effective_remaining_pct - self.virtual_used_pct).max(0.0)
    }

    /// True if any dimension with a known limit has zero or negative remaining budget.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.dimensions.iter().any(Dimension::is_exhausted)
    }

    /// `100 - effective_remaining_with_virtual()`, the scalar the Router's
    /// threshold semantics (`warning`/`switch`/`critical`) are expressed over.
    #[must_use]
    pub fn used_pct(&self) -> f64 {
        100.0 - self.effective_remaining_with_virtual()
    }

    /// Seconds until the nearest dimension reset, if any dimension has one.
    #[must_use]
    pub fn seconds_until_nearest_reset(&self, now: DateTime<Utc>) -> Option<i64> {
        self.dimensions
            .iter()
            .filter_map(|d| d.reset_at)
            .map(|reset_at| (reset_at - now).num_seconds().max(0))
            .min()
    }
}
