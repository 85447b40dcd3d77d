use quotaguard_types::{AlertType, QuotaInfo, Severity};

/// Evaluates one account's quota snapshot against the configured
/// thresholds, returning zero, one, or two findings: at most one threshold
/// crossing (the highest exceeded), plus an exhausted finding if any
/// dimension with a known limit has run out.
#[must_use]
pub fn evaluate_account(quota: &QuotaInfo, thresholds: &[f64]) -> Vec<(AlertType, Severity)> {
    let mut findings = Vec::with_capacity(2);
    let used_pct = quota.used_pct();

    if let Some(highest_exceeded) = thresholds
        .iter()
        .copied()
        .filter(|&threshold| used_pct >= threshold)
        .fold(None, |acc: Option<f64>, threshold| Some(acc.map_or(threshold, |current| current.max(threshold))))
    {
        let max_configured = thresholds.iter().copied().fold(f64::MIN, f64::max);
        let severity = if highest_exceeded >= max_configured {
            Severity::Critical
        } else {
            Severity::Warning
        };
        findings.push((AlertType::Threshold { threshold: highest_exceeded }, severity));
    }

    if quota.is_exhausted() {
        findings.push((AlertType::Exhausted, Severity::Critical));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaguard_types::{AccountId, Dimension, DimensionType, Provider, QuotaSource, WindowSemantics};

    fn quota(used: i64, limit: i64) -> QuotaInfo {
        let remaining = limit - used;
        QuotaInfo {
            account_id: AccountId::new("a1"),
            provider: Provider::OpenAiCodex,
            tier: "pro".into(),
            dimensions: vec![Dimension {
                dimension_type: DimensionType::Requests,
                limit,
                used,
                remaining,
                reset_at: None,
                window_semantics: WindowSemantics::Unknown,
                source: QuotaSource::Polling,
                confidence: 0.9,
            }],
            effective_remaining_pct: (remaining as f64 / limit as f64 * 100.0).max(0.0),
            virtual_used_pct: 0.0,
            is_throttled: false,
            source: QuotaSource::Polling,
            confidence: 0.9,
            collected_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn scenario_one_warning_at_86_used_out_of_100() {
        let q = quota(86, 100);
        let findings = evaluate_account(&q, &[85.0, 95.0]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0], (AlertType::Threshold { threshold: 85.0 }, Severity::Warning));
    }

    #[test]
    fn highest_configured_threshold_is_critical() {
        let q = quota(96, 100);
        let findings = evaluate_account(&q, &[85.0, 95.0]);
        assert_eq!(findings[0], (AlertType::Threshold { threshold: 95.0 }, Severity::Critical));
    }

    #[test]
    fn below_every_threshold_finds_nothing() {
        let q = quota(10, 100);
        let findings = evaluate_account(&q, &[85.0, 95.0]);
        assert!(findings.is_empty());
    }

    #[test]
    fn exhausted_dimension_always_adds_a_critical_finding() {
        let q = quota(100, 100);
        let findings = evaluate_account(&q, &[85.0, 95.0]);
        assert!(findings.contains(&(AlertType::Exhausted, Severity::Critical)));
    }
}
