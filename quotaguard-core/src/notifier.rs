use async_trait::async_trait;
use quotaguard_types::{AlertType, Severity};

use crate::error::QuotaGuardError;

/// One alert handed to a [`Notifier`] for delivery.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    /// Account the alert concerns.
    pub account_id: quotaguard_types::AccountId,
    /// What the evaluator found.
    pub alert_type: AlertType,
    /// Severity of the alert.
    pub severity: Severity,
    /// `usedPct` at evaluation time, included for operator context.
    pub used_pct: f64,
    /// Human-readable message suitable for direct display.
    pub message: String,
}

/// Daily digest payload synthesised by the digest scheduler.
#[derive(Debug, Clone)]
pub struct DigestData {
    /// Top accounts by `usedPct`, descending.
    pub top_accounts: Vec<(quotaguard_types::AccountId, f64)>,
    /// Count of alerts delivered since the last digest, grouped by severity.
    pub alert_counts_by_severity: Vec<(Severity, u64)>,
    /// Total accounts observed at digest time.
    pub total_accounts: usize,
}

/// The "Bot / Transport" external collaborator consumed by the Alert Service.
///
/// Delivery is fire-and-forget from the core's perspective: a `Notifier`
/// failure is logged but never blocks or rolls back the evaluator/dedup/
/// throttle pipeline that produced the alert.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a free-form text message.
    async fn send_message(&self, text: &str) -> Result<(), QuotaGuardError>;

    /// Sends a structured alert payload.
    async fn send_alert(&self, alert: &AlertPayload) -> Result<(), QuotaGuardError>;

    /// Sends the daily digest payload.
    async fn send_digest(&self, digest: &DigestData) -> Result<(), QuotaGuardError>;

    /// Whether this notifier is currently able to deliver (e.g. transport configured and connected).
    fn is_enabled(&self) -> bool;
}
