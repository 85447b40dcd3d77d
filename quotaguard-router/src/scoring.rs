use chrono::{DateTime, Utc};
use quotaguard_types::{Account, AccountId, QuotaInfo, QuotaSource, RouterConfig, Weights};

/// Per-candidate facts extracted from the Store, flattened for the pure
/// scoring/hysteresis functions below. Keeping this separate from `Account`
/// and `QuotaInfo` means those functions take no store reference at all.
#[derive(Debug, Clone)]
pub struct CandidateFacts {
    /// Candidate's account id.
    pub account_id: AccountId,
    /// Static tie-break priority; higher wins.
    pub priority: i32,
    /// Provider-reported tier string.
    pub tier: String,
    /// Relative cost coefficient, before normalisation against the candidate set.
    pub cost_coefficient: f64,
    /// `effective_remaining_with_virtual()` at the time of this decision.
    pub effective_remaining_with_virtual: f64,
    /// Seconds until the nearest known dimension reset, if any.
    pub seconds_until_nearest_reset: Option<i64>,
    /// `1 - recentErrorRate`, maintained by the Router's reliability tracker.
    pub reliability: f64,
    /// Provenance of the backing quota snapshot.
    pub source: QuotaSource,
}

/// Per-component score breakdown, surfaced on [`crate::RouteDecision`] for observability.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ScoreBreakdown {
    /// Weighted safety component.
    pub safety: f64,
    /// Weighted refill component.
    pub refill: f64,
    /// Weighted tier component.
    pub tier: f64,
    /// Weighted reliability component.
    pub reliability: f64,
    /// Weighted cost component.
    pub cost: f64,
    /// Sum of all weighted components.
    pub total: f64,
}

/// Known tier strings, worst to best; unrecognised tiers rank at the midpoint.
const TIER_ORDER: &[&str] = &["free", "basic", "pro", "team", "enterprise"];

/// Normalises a tier string to `[0, 1]` by position in [`TIER_ORDER`].
#[must_use]
pub fn tier_rank(tier: &str) -> f64 {
    let lower = tier.to_ascii_lowercase();
    match TIER_ORDER.iter().position(|t| *t == lower) {
        Some(idx) => idx as f64 / (TIER_ORDER.len() - 1) as f64,
        None => 0.5,
    }
}

/// Scores one candidate against `weights`, given the candidate set's maximum
/// `cost_coefficient` (for cost normalisation).
#[must_use]
pub fn score_candidate(facts: &CandidateFacts, weights: &Weights, max_cost_coefficient: f64) -> ScoreBreakdown {
    let safety = (facts.effective_remaining_with_virtual / 100.0).clamp(0.0, 1.0);
    let refill = 1.0 / (1.0 + facts.seconds_until_nearest_reset.unwrap_or(0) as f64 / 3600.0);
    let tier = tier_rank(&facts.tier);
    let reliability = facts.reliability.clamp(0.0, 1.0);
    let normalized_cost = if max_cost_coefficient > 0.0 {
        (facts.cost_coefficient / max_cost_coefficient).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cost = 1.0 - normalized_cost;

    let safety_w = weights.safety * safety;
    let refill_w = weights.refill * refill;
    let tier_w = weights.tier * tier;
    let reliability_w = weights.reliability * reliability;
    let cost_w = weights.cost * cost;

    ScoreBreakdown {
        safety: safety_w,
        refill: refill_w,
        tier: tier_w,
        reliability: reliability_w,
        cost: cost_w,
        total: safety_w + refill_w + tier_w + reliability_w + cost_w,
    }
}

/// True if `account`/`quota` clear the basic candidacy gate: selectable,
/// not `estimated` when `ignore_estimated` is set, and (unless relaxed by
/// the caller) at or above `min_safe`.
#[must_use]
pub fn passes_basic_gate(
    account: &Account,
    quota: &QuotaInfo,
    config: &RouterConfig,
    now: DateTime<Utc>,
    enforce_min_safe: bool,
) -> bool {
    if !account.is_selectable(now) {
        return false;
    }
    if config.ignore_estimated && quota.source == QuotaSource::Estimated {
        return false;
    }
    if enforce_min_safe && quota.effective_remaining_with_virtual() < config.min_safe {
        return false;
    }
    true
}

/// Picks the highest-scoring candidate, tie-broken by higher `priority` then
/// lexicographically smaller account id.
#[must_use]
pub fn pick_best<'a>(
    scored: &'a [(CandidateFacts, ScoreBreakdown)],
) -> Option<&'a (CandidateFacts, ScoreBreakdown)> {
    scored.iter().reduce(|best, candidate| {
        if candidate.1.total > best.1.total {
            candidate
        } else if candidate.1.total < best.1.total {
            best
        } else if candidate.0.priority > best.0.priority {
            candidate
        } else if candidate.0.priority < best.0.priority {
            best
        } else if candidate.0.account_id < best.0.account_id {
            candidate
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(id: &str, remaining: f64, reset_secs: Option<i64>, priority: i32, cost: f64) -> CandidateFacts {
        CandidateFacts {
            account_id: AccountId::new(id),
            priority,
            tier: "pro".into(),
            cost_coefficient: cost,
            effective_remaining_with_virtual: remaining,
            seconds_until_nearest_reset: reset_secs,
            reliability: 1.0,
            source: QuotaSource::Polling,
        }
    }

    #[test]
    fn tier_rank_orders_known_tiers() {
        assert!(tier_rank("free") < tier_rank("pro"));
        assert!(tier_rank("pro") < tier_rank("enterprise"));
        assert!((tier_rank("unknown-tier") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn scenario_two_hysteresis_scores_match_spec_example() {
        let weights = Weights::default();
        let a = facts("a", 60.0, None, 0, 0.0);
        let b = facts("b", 70.0, None, 0, 0.0);
        let score_a = score_candidate(&a, &weights, 0.0).total;
        let score_b = score_candidate(&b, &weights, 0.0).total;
        assert!(score_b > score_a);
    }

    #[test]
    fn pick_best_breaks_ties_by_priority_then_account_id() {
        let weights = Weights::default();
        let low_priority = facts("z", 50.0, None, 0, 0.0);
        let high_priority = facts("a", 50.0, None, 5, 0.0);
        let scored = vec![
            (low_priority.clone(), score_candidate(&low_priority, &weights, 0.0)),
            (high_priority.clone(), score_candidate(&high_priority, &weights, 0.0)),
        ];
        let best = pick_best(&scored).unwrap();
        assert_eq!(best.0.account_id, high_priority.account_id);
    }

    #[test]
    fn pick_best_breaks_equal_priority_ties_lexicographically() {
        let weights = Weights::default();
        let first = facts("a", 50.0, None, 0, 0.0);
        let second = facts("b", 50.0, None, 0, 0.0);
        let scored = vec![
            (second.clone(), score_candidate(&second, &weights, 0.0)),
            (first.clone(), score_candidate(&first, &weights, 0.0)),
        ];
        let best = pick_best(&scored).unwrap();
        assert_eq!(best.0.account_id, first.account_id);
    }
}
