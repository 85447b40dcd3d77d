use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quotaguard_types::MuteState;

/// Global mute gate for the Alert Service. While active, the evaluator's
/// findings are discarded before dedup/throttle ever see them.
#[derive(Default)]
pub struct MuteGate {
    state: Mutex<Option<MuteState>>,
}

impl MuteGate {
    /// Builds an unmuted gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engages the mute for `duration`, starting at `now`.
    pub fn mute(&self, duration: Duration, reason: String, now: DateTime<Utc>) {
        let until = now + chrono::Duration::from_std(duration).unwrap_or_default();
        *self.state.lock().expect("mute mutex poisoned") = Some(MuteState {
            muted: true,
            until,
            reason,
        });
    }

    /// Clears any active mute immediately.
    pub fn unmute(&self) {
        *self.state.lock().expect("mute mutex poisoned") = None;
    }

    /// Remaining mute duration if currently active, `None` otherwise. Also
    /// auto-clears an expired mute so subsequent checks are O(1).
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let mut guard = self.state.lock().expect("mute mutex poisoned");
        match guard.as_ref() {
            Some(mute) if mute.is_active(now) => mute.remaining(now),
            Some(_) => {
                *guard = None;
                None
            }
            None => None,
        }
    }

    /// True if the gate is currently muted.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_blocks_until_duration_elapses() {
        let gate = MuteGate::new();
        let now = Utc::now();
        gate.mute(Duration::from_secs(120), "maintenance".into(), now);
        assert!(gate.is_active(now));
        let remaining = gate.remaining(now).unwrap();
        assert!(remaining <= chrono::Duration::seconds(120) && remaining > chrono::Duration::seconds(119));
        let after = now + chrono::Duration::seconds(121);
        assert!(!gate.is_active(after));
    }

    #[test]
    fn unmute_clears_immediately() {
        let gate = MuteGate::new();
        let now = Utc::now();
        gate.mute(Duration::from_secs(120), "x".into(), now);
        gate.unmute();
        assert!(!gate.is_active(now));
    }
}
