use std::time::Duration;

use quotaguard_types::AccountId;
use thiserror::Error;

/// Unified error type for the QuotaGuard workspace.
///
/// Mirrors the single-enum-per-workspace convention: every component-local
/// failure (breaker trips, queue overflow, router refusal, ...) is a
/// variant here rather than a separate per-crate error type, so a caller
/// only ever matches on one type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuotaGuardError {
    /// The referenced account does not exist in the Store.
    #[error("account not found: {account_id}")]
    AccountNotFound {
        /// The account id that was looked up.
        account_id: AccountId,
    },

    /// No `QuotaInfo` snapshot is available yet for the account.
    #[error("quota missing for account: {account_id}")]
    QuotaMissing {
        /// The account whose quota snapshot is missing.
        account_id: AccountId,
    },

    /// The upstream provider rejected the request as rate-limited.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited {
        /// Provider-reported (or estimated) duration to wait before retrying.
        retry_after: Duration,
    },

    /// Authentication against the upstream provider failed (expired/invalid credentials).
    #[error("auth failure for account {account_id}: {msg}")]
    AuthFailure {
        /// The account whose credentials failed.
        account_id: AccountId,
        /// Provider-reported or locally classified failure message.
        msg: String,
    },

    /// A fetch attempt exceeded its configured timeout.
    #[error("fetch timed out for account {account_id}")]
    FetchTimeout {
        /// The account whose fetch attempt timed out.
        account_id: AccountId,
    },

    /// A transient error occurred while fetching quota; distinct from a hard failure.
    #[error("transient fetch error for account {account_id}: {msg}")]
    TransientFetchError {
        /// The account whose fetch attempt failed transiently.
        account_id: AccountId,
        /// Human-readable cause.
        msg: String,
    },

    /// The active collector's circuit breaker is open; the poll cycle was skipped.
    #[error("breaker open, retry after {retry_after:?}")]
    BreakerOpen {
        /// Time remaining until the breaker allows a half-open probe.
        retry_after: Duration,
    },

    /// A bounded queue (passive ingest, alert pending queue) is at capacity.
    #[error("queue full")]
    QueueFull,

    /// The Router could not find any account meeting candidacy requirements.
    #[error("no suitable account: {reason}")]
    NoSuitableAccount {
        /// Human-readable reason (all below min-safe, all blocked, ...).
        reason: String,
    },

    /// A reservation was swept by the background sweeper after expiring; not caller-visible
    /// in practice, retained for completeness of the error-kind table.
    #[error("reservation expired: {reservation_id}")]
    ReservationExpired {
        /// The reservation id that expired.
        reservation_id: String,
    },

    /// The referenced reservation does not exist or is not active.
    #[error("reservation not found or not active: {reservation_id}")]
    ReservationNotActive {
        /// The reservation id that was looked up.
        reservation_id: String,
    },

    /// A hot-reloaded configuration value failed validation; the prior configuration is kept.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    /// The calling operation was cancelled via its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// A timed wait (e.g. `Waiter::acquire`) exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Catch-all for errors that do not fit a more specific variant.
    #[error("{0}")]
    Other(String),
}

impl QuotaGuardError {
    /// Builds an [`QuotaGuardError::AccountNotFound`].
    pub fn account_not_found(account_id: impl Into<AccountId>) -> Self {
        Self::AccountNotFound {
            account_id: account_id.into(),
        }
    }

    /// Builds a [`QuotaGuardError::QuotaMissing`].
    pub fn quota_missing(account_id: impl Into<AccountId>) -> Self {
        Self::QuotaMissing {
            account_id: account_id.into(),
        }
    }

    /// Builds a [`QuotaGuardError::RateLimited`].
    #[must_use]
    pub const fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Builds a [`QuotaGuardError::AuthFailure`].
    pub fn auth_failure(account_id: impl Into<AccountId>, msg: impl Into<String>) -> Self {
        Self::AuthFailure {
            account_id: account_id.into(),
            msg: msg.into(),
        }
    }

    /// Builds a [`QuotaGuardError::FetchTimeout`].
    pub fn fetch_timeout(account_id: impl Into<AccountId>) -> Self {
        Self::FetchTimeout {
            account_id: account_id.into(),
        }
    }

    /// Builds a [`QuotaGuardError::TransientFetchError`].
    pub fn transient(account_id: impl Into<AccountId>, msg: impl Into<String>) -> Self {
        Self::TransientFetchError {
            account_id: account_id.into(),
            msg: msg.into(),
        }
    }

    /// Builds a [`QuotaGuardError::BreakerOpen`].
    #[must_use]
    pub const fn breaker_open(retry_after: Duration) -> Self {
        Self::BreakerOpen { retry_after }
    }

    /// Builds a [`QuotaGuardError::NoSuitableAccount`].
    pub fn no_suitable_account(reason: impl Into<String>) -> Self {
        Self::NoSuitableAccount {
            reason: reason.into(),
        }
    }
}
