//! quotaguard-router
//!
//! Candidate filtering, weighted scoring, and anti-flap hysteresis over the
//! account fleet, producing one `RouteDecision` per request.
#![warn(missing_docs)]

/// Anti-flap state machine (`RouterState`, `decide`).
pub mod hysteresis;
/// Router orchestration (`Router`, `RouteRequest`, `RouteDecision`).
pub mod router;
/// Pure scoring functions (`CandidateFacts`, `score_candidate`, `pick_best`).
pub mod scoring;

pub use hysteresis::{decide, Decision, RouterState};
pub use router::{Router, RouteDecision, RouteRequest};
pub use scoring::{passes_basic_gate, pick_best, score_candidate, tier_rank, CandidateFacts, ScoreBreakdown};
