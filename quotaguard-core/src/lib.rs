//! quotaguard-core
//!
//! Core traits and the shared error type for the QuotaGuard workspace.
//!
//! - `error`: the single `QuotaGuardError` type shared by every component.
//! - `clock`: the `Clock` abstraction used wherever a component sleeps or reads "now".
//! - `store`: the `Store` contract (accounts, credentials, quotas, reservations, settings).
//! - `fetcher`: the `QuotaFetcher` interface injected into the active collector.
//! - `notifier`: the `Notifier` ("Bot / Transport") interface consumed by the Alert Service.
#![warn(missing_docs)]

/// Time source abstraction (`Clock`, `SystemClock`).
pub mod clock;
/// Shared error type for the workspace.
pub mod error;
/// Provider quota-fetching interface (`QuotaFetcher`).
pub mod fetcher;
/// Alert delivery interface (`Notifier`, `AlertPayload`, `DigestData`).
pub mod notifier;
/// Persistence and pub/sub interface (`Store` and its constituent traits).
pub mod store;

pub use clock::{Clock, SystemClock};
pub use error::QuotaGuardError;
pub use fetcher::QuotaFetcher;
pub use notifier::{AlertPayload, DigestData, Notifier};
pub use store::{Accounts, Credentials, QuotaEvent, QuotaSubscription, Quotas, Reservations, SharedStore, Settings, Store};
