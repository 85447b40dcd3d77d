use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// Upstream AI provider a fleet account belongs to.
///
/// `Other` keeps the type forward-compatible with providers not known at
/// compile time, the way `borsa-types`'s strategy enums keep an escape
/// hatch for unrecognized connector keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Provider {
    /// OpenAI Codex.
    OpenAiCodex,
    /// Anthropic Antigravity.
    AnthropicAntigravity,
    /// Google Gemini.
    Gemini,
    /// Alibaba Qwen.
    Qwen,
    /// Any provider not covered by the named variants.
    Other(String),
}

impl core::fmt::Display for Provider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OpenAiCodex => f.write_str("openai-codex"),
            Self::AnthropicAntigravity => f.write_str("anthropic-antigravity"),
            Self::Gemini => f.write_str("gemini"),
            Self::Qwen => f.write_str("qwen"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Authentication subtype of an account's credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ProviderType {
    /// Static API key.
    ApiKey,
    /// OAuth2 access/refresh token pair.
    OAuth,
    /// Service-account style credential (e.g. a signed JWT assertion).
    ServiceAccount,
    /// Any auth subtype not covered by the named variants.
    Other(String),
}

impl core::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ApiKey => f.write_str("api-key"),
            Self::OAuth => f.write_str("oauth"),
            Self::ServiceAccount => f.write_str("service-account"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// A single upstream account in the fleet.
///
/// `id` is unique and immutable for the lifetime of the account. `enabled`
/// and `blocked_until` together gate selection by the Router (see
/// [`Account::is_selectable`]) without affecting the Collector, which still
/// observes disabled/blocked accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique, immutable account identity.
    pub id: AccountId,
    /// Upstream provider this account authenticates against.
    pub provider: Provider,
    /// Authentication subtype used by this account's credentials.
    pub provider_type: ProviderType,
    /// Provider-reported subscription/plan tier (e.g. "pro", "team").
    pub tier: String,
    /// Whether the Router may ever select this account.
    pub enabled: bool,
    /// Static priority used as a scoring tie-break; higher wins.
    pub priority: i32,
    /// Maximum concurrent in-flight requests; `<= 0` means unlimited.
    pub concurrency_limit: i64,
    /// Relative cost coefficient used by the Router's cost scoring component.
    pub cost_coefficient: f64,
    /// If set and in the future, equivalent to `enabled = false` for selection.
    pub blocked_until: Option<DateTime<Utc>>,
    /// Opaque reference the Store uses to look up this account's credentials.
    pub credentials_ref: String,
}

impl Account {
    /// True if `blocked_until` is set and still in the future relative to `now`.
    #[must_use]
    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }

    /// True if the Router may consider this account a candidate.
    ///
    /// Does not evaluate quota thresholds; callers still need a current
    /// `QuotaInfo` to fully qualify an account as a candidate.
    #[must_use]
    pub fn is_selectable(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.is_blocked(now)
    }
}

/// Provider-specific credential material for an [`Account`], keyed by account id.
///
/// Owned exclusively by the Store; the Router never reads this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCredentials {
    /// Account this credential set belongs to.
    pub account_id: AccountId,
    /// Bearer token, API key, or equivalent primary secret.
    pub token: String,
    /// Refresh material, if the provider supports token refresh.
    pub refresh_token: Option<String>,
    /// Instant at which `token` expires and must be refreshed.
    pub expires_at: Option<DateTime<Utc>>,
}
