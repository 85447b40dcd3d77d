use std::sync::Mutex;

use async_trait::async_trait;
use quotaguard_core::error::QuotaGuardError;
use quotaguard_core::notifier::{AlertPayload, DigestData, Notifier};

/// Records every message, alert, and digest it is handed, for assertion in
/// tests. Optionally configured to fail delivery to exercise the Alert
/// Service's fire-and-forget error handling.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    alerts: Mutex<Vec<AlertPayload>>,
    digests: Mutex<Vec<DigestData>>,
    fail: Mutex<bool>,
    enabled: Mutex<bool>,
}

impl RecordingNotifier {
    /// Builds an enabled, non-failing recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
            digests: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
            enabled: Mutex::new(true),
        }
    }

    /// Makes every subsequent `send_*` call return `QuotaGuardError::Other`.
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().expect("notifier fail flag poisoned") = fail;
    }

    /// Sets whether `is_enabled` reports true.
    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.lock().expect("notifier enabled flag poisoned") = enabled;
    }

    /// Alerts delivered so far, in delivery order.
    #[must_use]
    pub fn alerts(&self) -> Vec<AlertPayload> {
        self.alerts.lock().expect("notifier alerts poisoned").clone()
    }

    /// Digests delivered so far, in delivery order.
    #[must_use]
    pub fn digests(&self) -> Vec<DigestData> {
        self.digests.lock().expect("notifier digests poisoned").clone()
    }

    /// Free-form messages delivered so far, in delivery order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("notifier messages poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, text: &str) -> Result<(), QuotaGuardError> {
        if *self.fail.lock().expect("notifier fail flag poisoned") {
            return Err(QuotaGuardError::Other("mock notifier configured to fail".into()));
        }
        self.messages.lock().expect("notifier messages poisoned").push(text.to_owned());
        Ok(())
    }

    async fn send_alert(&self, alert: &AlertPayload) -> Result<(), QuotaGuardError> {
        if *self.fail.lock().expect("notifier fail flag poisoned") {
            return Err(QuotaGuardError::Other("mock notifier configured to fail".into()));
        }
        self.alerts.lock().expect("notifier alerts poisoned").push(alert.clone());
        Ok(())
    }

    async fn send_digest(&self, digest: &DigestData) -> Result<(), QuotaGuardError> {
        if *self.fail.lock().expect("notifier fail flag poisoned") {
            return Err(QuotaGuardError::Other("mock notifier configured to fail".into()));
        }
        self.digests.lock().expect("notifier digests poisoned").push(digest.clone());
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        *self.enabled.lock().expect("notifier enabled flag poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaguard_types::{AccountId, AlertType, Severity};

    fn alert() -> AlertPayload {
        AlertPayload {
            account_id: AccountId::new("a1"),
            alert_type: AlertType::Threshold { threshold: 85.0 },
            severity: Severity::Warning,
            used_pct: 86.0,
            message: "86% used".into(),
        }
    }

    #[tokio::test]
    async fn recorded_alerts_are_returned_in_order() {
        let notifier = RecordingNotifier::new();
        notifier.send_alert(&alert()).await.unwrap();
        assert_eq!(notifier.alerts().len(), 1);
    }

    #[tokio::test]
    async fn failing_notifier_returns_error_and_records_nothing() {
        let notifier = RecordingNotifier::new();
        notifier.set_failing(true);
        let result = notifier.send_alert(&alert()).await;
        assert!(result.is_err());
        assert!(notifier.alerts().is_empty());
    }

    #[tokio::test]
    async fn disabled_notifier_still_reports_is_enabled_false() {
        let notifier = RecordingNotifier::new();
        notifier.set_enabled(false);
        assert!(!notifier.is_enabled());
    }
}
