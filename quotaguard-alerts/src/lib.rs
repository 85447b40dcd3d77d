//! quotaguard-alerts
//!
//! Threshold evaluation, dedup, throttling, muting, and daily digest
//! scheduling, delivered through an injected [`quotaguard_core::Notifier`].
#![warn(missing_docs)]

/// Dedup table (`Dedup`).
pub mod dedup;
/// Digest fire-time computation (`next_fire_time`).
pub mod digest;
/// Pure threshold/exhaustion evaluation (`evaluate_account`).
pub mod evaluator;
/// Global mute gate (`MuteGate`).
pub mod mute;
/// Alert Service orchestration (`AlertService`, `AlertsHandle`).
pub mod service;
/// Continuous-refill token bucket (`TokenBucket`).
pub mod throttle;

pub use dedup::Dedup;
pub use digest::next_fire_time;
pub use evaluator::evaluate_account;
pub use mute::MuteGate;
pub use service::{AlertService, AlertsHandle};
pub use throttle::TokenBucket;
