use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quotaguard_core::clock::Clock;
use tokio::time::Instant as TokioInstant;

/// A [`Clock`] whose `now()` tracks a virtual instant derived from
/// `tokio::time::Instant`, the paused-time clock `tokio::time::pause`/
/// `advance` drive.
///
/// `tokio::time::advance` alone does not move `chrono::Utc::now()`, so this
/// clock anchors a `(virtual_start, tokio_baseline)` pair at construction and
/// computes `now()` as `virtual_start + (Instant::now() - tokio_baseline)` on
/// every call, so concurrent sleepers racing the same paused clock all see a
/// consistent instant instead of double-counting each other's advances.
/// Construct it only inside a `#[tokio::test(start_paused = true)]` (or after
/// calling `tokio::time::pause()` manually) or `sleep` will race real time.
pub struct VirtualClock {
    virtual_start: DateTime<Utc>,
    tokio_baseline: TokioInstant,
}

impl VirtualClock {
    /// Anchors the virtual clock at `start`, using the current paused
    /// `tokio::time::Instant` as the baseline.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            virtual_start: start,
            tokio_baseline: TokioInstant::now(),
        }
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TokioInstant::now().saturating_duration_since(self.tokio_baseline);
        self.virtual_start + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_now_by_the_slept_duration() {
        let start = Utc::now();
        let clock = VirtualClock::new(start);
        clock.sleep(Duration::from_secs(60)).await;
        assert_eq!(clock.now(), start + chrono::Duration::seconds(60));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sleepers_all_observe_the_same_advanced_instant() {
        let start = Utc::now();
        let clock = std::sync::Arc::new(VirtualClock::new(start));

        let a = {
            let clock = clock.clone();
            tokio::spawn(async move {
                clock.sleep(Duration::from_secs(30)).await;
                clock.now()
            })
        };
        let b = {
            let clock = clock.clone();
            tokio::spawn(async move {
                clock.sleep(Duration::from_secs(30)).await;
                clock.now()
            })
        };

        let (ra, rb) = tokio::join!(a, b);
        let expected = start + chrono::Duration::seconds(30);
        assert_eq!(ra.unwrap(), expected);
        assert_eq!(rb.unwrap(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn now_advances_between_calls_once_paused_time_moves() {
        let start = Utc::now();
        let clock = VirtualClock::new(start);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.now(), start + chrono::Duration::seconds(5));
    }
}
