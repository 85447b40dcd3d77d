use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, CorrelationId, ReservationId};

/// Lifecycle state of a [`Reservation`].
///
/// Exactly one of the non-`Active` variants is terminal; a reservation never
/// re-enters `Active` once it leaves that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ReservationStatus {
    /// Holding a soft claim against future usage.
    Active,
    /// Committed with an actual cost recorded via `Commit`.
    Released,
    /// Withdrawn via `Cancel` before being committed.
    Cancelled,
    /// Swept by the background sweeper after `expires_at` elapsed.
    Expired,
}

impl ReservationStatus {
    /// True for any of the three terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A short-lived, soft claim against an account's future usage.
///
/// Issued by the Reservation Manager on behalf of the Router; the sum of
/// `estimated_cost_pct` across all `Active` reservations for an account must
/// equal that account's `QuotaInfo::virtual_used_pct` at every quiescent
/// point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identity.
    pub id: ReservationId,
    /// Account this reservation holds usage against.
    pub account_id: AccountId,
    /// Caller-supplied correlation id for tracing a request end to end.
    pub correlation_id: CorrelationId,
    /// Estimated cost as a percentage of the account's budget, in `[0, 100]`.
    pub estimated_cost_pct: f64,
    /// Actual cost recorded at `Commit`, if committed.
    pub actual_cost_pct: Option<f64>,
    /// Current lifecycle state.
    pub status: ReservationStatus,
    /// When this reservation was created.
    pub created_at: DateTime<Utc>,
    /// When this reservation expires if never committed or cancelled.
    pub expires_at: DateTime<Utc>,
    /// When this reservation left the `Active` state, if it has.
    pub released_at: Option<DateTime<Utc>>,
}
