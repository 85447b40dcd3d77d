use chrono::{DateTime, Utc};
use quotaguard_types::{AccountId, RouterConfig};

use crate::scoring::{pick_best, CandidateFacts, ScoreBreakdown};

/// The Router's anti-flap memory: current selection plus the two clocks
/// that gate a switch away from it.
#[derive(Debug, Clone, Default)]
pub struct RouterState {
    /// Account currently selected, or `None` before the first decision.
    pub current_selection: Option<AccountId>,
    /// When the selection was last changed.
    pub last_switch_at: Option<DateTime<Utc>>,
    /// When the current selection started being the incumbent.
    pub dwell_start: Option<DateTime<Utc>>,
}

/// Outcome of one hysteresis decision over an already-built candidate set.
#[derive(Debug, Clone)]
pub struct Decision {
    /// The account selected for this request.
    pub account_id: AccountId,
    /// Winning candidate's score breakdown.
    pub score: ScoreBreakdown,
    /// True if this decision changed `current_selection`.
    pub switched: bool,
    /// Human-readable reason, surfaced on `RouteDecision::reason`.
    pub reason: &'static str,
}

/// Applies the spec's hysteresis/anti-flap rule to an already-scored
/// candidate set, given the Router's current state. Pure and synchronous:
/// all store reads have already happened by the time this runs.
///
/// Returns `None` only if `scored` is empty; callers translate that into
/// `NoSuitableAccount`.
#[must_use]
pub fn decide(
    scored: &[(CandidateFacts, ScoreBreakdown)],
    state: &RouterState,
    config: &RouterConfig,
    now: DateTime<Utc>,
) -> Option<Decision> {
    let (best_facts, best_score) = pick_best(scored)?;

    let Some(current) = &state.current_selection else {
        return Some(Decision {
            account_id: best_facts.account_id.clone(),
            score: *best_score,
            switched: true,
            reason: "initial selection",
        });
    };

    let incumbent = scored.iter().find(|(c, _)| &c.account_id == current);
    let Some((_, incumbent_score)) = incumbent else {
        return Some(Decision {
            account_id: best_facts.account_id.clone(),
            score: *best_score,
            switched: true,
            reason: "incumbent failed candidacy",
        });
    };

    if &best_facts.account_id == current {
        return Some(Decision {
            account_id: current.clone(),
            score: *best_score,
            switched: false,
            reason: "incumbent remains best candidate",
        });
    }

    let gap = best_score.total - incumbent_score.total;
    let dwell_ok = state.dwell_start.is_none_or(|start| {
        now - start >= chrono::Duration::from_std(config.min_dwell_time).unwrap_or_default()
    });
    let cooldown_ok = state.last_switch_at.is_none_or(|at| {
        now - at >= chrono::Duration::from_std(config.cooldown_after_switch).unwrap_or_default()
    });

    if gap >= config.hysteresis_margin && dwell_ok && cooldown_ok {
        Some(Decision {
            account_id: best_facts.account_id.clone(),
            score: *best_score,
            switched: true,
            reason: "challenger cleared hysteresis margin, dwell, and cooldown",
        })
    } else {
        Some(Decision {
            account_id: current.clone(),
            score: *incumbent_score,
            switched: false,
            reason: "challenger did not clear anti-flap gates",
        })
    }
}
