//! quotaguard-mock
//!
//! Deterministic test doubles for the traits in `quotaguard-core`: a
//! scripted [`QuotaFetcher`], a recording [`Notifier`], and a virtual
//! [`Clock`] that advances in lockstep with `tokio::time::pause`/`advance`.
#![warn(missing_docs)]

/// Virtual clock built on `tokio::time` (`VirtualClock`).
pub mod clock;
/// Scripted quota fetcher (`MockFetcher`, `FetchBehavior`).
pub mod fetcher;
/// Recording notifier (`RecordingNotifier`).
pub mod notifier;

pub use clock::VirtualClock;
pub use fetcher::{FetchBehavior, MockFetcher};
pub use notifier::RecordingNotifier;
