use async_trait::async_trait;
use quotaguard_types::{AccountCredentials, QuotaInfo};

use crate::error::QuotaGuardError;

/// Strategy object that turns one account's credentials into a fresh
/// [`QuotaInfo`] snapshot by calling an upstream provider.
///
/// One implementation per `ProviderType`/`Provider`, registered by the
/// Active collector the same way the teacher registers connectors by key.
/// Errors distinguish rate-limiting (which sets `blocked_until` but does
/// not trip the breaker) from everything else (which counts toward the
/// breaker's failure threshold).
#[async_trait]
pub trait QuotaFetcher: Send + Sync {
    /// Fetches a fresh quota snapshot for the given account.
    ///
    /// Implementations should return `QuotaGuardError::RateLimited` for a
    /// provider-reported rate limit, `QuotaGuardError::AuthFailure` for an
    /// auth/credential rejection, and `QuotaGuardError::TransientFetchError`
    /// for anything else retryable.
    async fn fetch_quota(
        &self,
        account_id: &quotaguard_types::AccountId,
        credentials: &AccountCredentials,
    ) -> Result<QuotaInfo, QuotaGuardError>;

    /// Stable name used in logs and breaker diagnostics (e.g. `"openai-codex"`).
    fn name(&self) -> &'static str;
}
