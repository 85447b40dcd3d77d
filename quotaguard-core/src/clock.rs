use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time source injected into every component that owns a ticker, dwell
/// timer, breaker timeout, or digest deadline.
///
/// Exists so tests can substitute a virtual clock (see `quotaguard-mock`)
/// and drive dwell/cooldown/digest timing deterministically instead of
/// sleeping in wall-clock time.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock instant.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Suspends the caller until `deadline`, or returns immediately if it has already passed.
    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let now = self.now();
        if deadline > now {
            let remaining = (deadline - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.sleep(remaining).await;
        }
    }
}

/// Default `Clock` backed by the system clock and `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
