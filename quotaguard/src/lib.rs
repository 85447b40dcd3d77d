//! QuotaGuard fronts a fleet of upstream AI provider accounts, routing each
//! request to the healthiest account with sufficient quota headroom.
//!
//! Overview
//! - Tracks each account's quota via active polling (provider fetchers) and
//!   passive ingestion (response headers from the calling application).
//! - Routes by quota, reliability, and anti-flap policy (hysteresis,
//!   minimum dwell time, cooldown after switching).
//! - Reserves estimated cost against an account before a request goes out,
//!   truing it up to the real cost once the caller reports it.
//! - Gates outbound concurrency per account and raises deduplicated,
//!   throttled, mutable alerts as accounts approach exhaustion.
//!
//! Construction goes through [`QuotaGuardBuilder`]; at minimum a
//! [`quotaguard_core::Notifier`] must be registered before [`QuotaGuardBuilder::build`]
//! succeeds. Everything else — the store, quota fetchers, header adapters,
//! and the clock — has a workable default.
#![warn(missing_docs)]

mod config;
mod core;

pub use config::{RawConfig, Settings};
pub use core::{QuotaGuard, QuotaGuardBuilder, QuotaGuardHandle};

pub use quotaguard_core::{
    Accounts, AlertPayload, Clock, Credentials, DigestData, Notifier, QuotaFetcher, QuotaGuardError, SharedStore, Store, SystemClock,
};

// Re-export collaborator types for convenience, so a caller building on
// top of the facade rarely needs a direct dependency on the constituent
// crates.
pub use quotaguard_alerts::{AlertService, AlertsHandle};
pub use quotaguard_collector::{ActiveCollector, HeaderAdapter, HeaderBag, JitterSource, NoJitter, PassiveCollector, RandomJitter};
pub use quotaguard_limiter::Limiter;
pub use quotaguard_reservation::ReservationManager;
pub use quotaguard_router::{RouteDecision, RouteRequest, Router};
pub use quotaguard_store::MemoryStore;
pub use quotaguard_types::{
    Account, AccountCredentials, AccountId, ActiveCollectorConfig, AlertConfig, LimiterConfig, PassiveCollectorConfig, Provider,
    ProviderType, QuotaInfo, Reservation, ReservationConfig, ReservationId, RouterConfig, Severity, StoreConfig,
};
