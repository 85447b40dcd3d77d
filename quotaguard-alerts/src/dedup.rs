use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quotaguard_types::{AlertRecord, DedupKey};

/// Collapses repeated `(account, type, severity)` alerts within a rolling window.
///
/// A single alert stream may re-observe the same condition every evaluation
/// cycle; the window is anchored on the last *delivered* occurrence so a
/// steady-state condition alerts once per window rather than never again.
pub struct Dedup {
    records: Mutex<HashMap<DedupKey, AlertRecord>>,
    window: Duration,
}

impl Dedup {
    /// Builds a dedup table with the given collapse window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Observes one occurrence of `key` at `now`. Returns `true` if this
    /// occurrence should be delivered (first sighting, or the window has
    /// elapsed since the last delivery), `false` if it should be suppressed.
    pub fn observe(&self, key: DedupKey, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::from_std(self.window).unwrap_or_default();
        let mut records = self.records.lock().expect("dedup mutex poisoned");
        match records.get_mut(&key) {
            Some(record) if now - record.sent_at < window => {
                record.count += 1;
                false
            }
            Some(record) => {
                record.sent_at = now;
                record.count += 1;
                true
            }
            None => {
                let record = AlertRecord {
                    key: key.to_string(),
                    sent_at: now,
                    count: 1,
                };
                records.insert(key, record);
                true
            }
        }
    }

    /// Drops records whose window has fully elapsed, bounding memory for
    /// accounts/alert types that have stopped firing.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let window = chrono::Duration::from_std(self.window).unwrap_or_default();
        self.records
            .lock()
            .expect("dedup mutex poisoned")
            .retain(|_, record| now - record.sent_at < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaguard_types::{AccountId, Severity};

    fn key(id: &str) -> DedupKey {
        DedupKey::new(AccountId::new(id), &quotaguard_types::AlertType::Exhausted, Severity::Critical)
    }

    #[test]
    fn first_observation_always_delivers() {
        let dedup = Dedup::new(Duration::from_secs(1800));
        assert!(dedup.observe(key("a"), Utc::now()));
    }

    #[test]
    fn duplicate_within_window_is_suppressed() {
        let dedup = Dedup::new(Duration::from_secs(1800));
        let now = Utc::now();
        assert!(dedup.observe(key("a"), now));
        assert!(!dedup.observe(key("a"), now + chrono::Duration::minutes(10)));
    }

    #[test]
    fn duplicate_after_window_elapses_delivers_again() {
        let dedup = Dedup::new(Duration::from_secs(1800));
        let now = Utc::now();
        assert!(dedup.observe(key("a"), now));
        assert!(!dedup.observe(key("a"), now + chrono::Duration::minutes(10)));
        let after_window = now + chrono::Duration::minutes(30) + chrono::Duration::seconds(1);
        assert!(dedup.observe(key("a"), after_window));
    }

    #[test]
    fn sweep_drops_stale_records() {
        let dedup = Dedup::new(Duration::from_secs(60));
        let now = Utc::now();
        dedup.observe(key("a"), now);
        dedup.sweep(now + chrono::Duration::seconds(120));
        assert_eq!(dedup.records.lock().unwrap().len(), 0);
    }
}
