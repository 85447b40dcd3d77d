//! quotaguard-collector
//!
//! Hybrid quota collection: buffered passive ingestion from callers, and
//! adaptive-interval active polling of the provider fleet behind a
//! per-collector circuit breaker.
#![warn(missing_docs)]

/// Active polling (`ActiveCollector`, circuit breaker, adaptive interval).
pub mod active;
/// Per-collector circuit breaker (`CircuitBreaker`).
pub mod breaker;
/// Buffered passive ingestion (`PassiveCollector`, `HeaderAdapter`).
pub mod passive;

pub use active::{ActiveCollector, JitterSource, NoJitter, PollerHandle, RandomJitter, next_interval, spawn_polling_loop};
pub use breaker::CircuitBreaker;
pub use passive::{FlusherHandle, HeaderAdapter, HeaderBag, PassiveCollector};
