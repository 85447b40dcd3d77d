use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

struct BucketState {
    tokens: f64,
    updated_at: DateTime<Utc>,
}

/// Continuous-refill token bucket gating alert delivery.
///
/// `capacity = rate_per_minute`, refilling at `rate_per_minute / 60`
/// tokens per second, matching the retrieval pack's rate-limiter shape.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    rate_per_second: f64,
}

impl TokenBucket {
    /// Builds a full bucket sized to `rate_per_minute`.
    #[must_use]
    pub fn new(rate_per_minute: u32, now: DateTime<Utc>) -> Self {
        let capacity = f64::from(rate_per_minute).max(0.0);
        Self {
            state: Mutex::new(BucketState { tokens: capacity, updated_at: now }),
            capacity,
            rate_per_second: capacity / 60.0,
        }
    }

    /// Attempts to take one token. On success, one token is consumed. On
    /// failure, returns the duration until one token will be available.
    pub fn try_acquire(&self, now: DateTime<Utc>) -> Result<(), Duration> {
        let mut state = self.state.lock().expect("token bucket mutex poisoned");
        let elapsed = (now - state.updated_at).num_milliseconds().max(0) as f64 / 1000.0;
        state.tokens = (state.tokens + elapsed * self.rate_per_second).min(self.capacity);
        state.updated_at = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else if self.rate_per_second <= 0.0 {
            Err(Duration::MAX)
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.rate_per_second))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_starts_full_and_drains() {
        let now = Utc::now();
        let bucket = TokenBucket::new(2, now);
        assert!(bucket.try_acquire(now).is_ok());
        assert!(bucket.try_acquire(now).is_ok());
        assert!(bucket.try_acquire(now).is_err());
    }

    #[test]
    fn bucket_refills_over_time() {
        let now = Utc::now();
        let bucket = TokenBucket::new(60, now);
        for _ in 0..60 {
            bucket.try_acquire(now).unwrap();
        }
        assert!(bucket.try_acquire(now).is_err());
        let later = now + chrono::Duration::seconds(1);
        assert!(bucket.try_acquire(later).is_ok());
    }

    #[test]
    fn retry_after_reflects_remaining_deficit() {
        let now = Utc::now();
        let bucket = TokenBucket::new(60, now);
        for _ in 0..60 {
            bucket.try_acquire(now).unwrap();
        }
        let err = bucket.try_acquire(now).unwrap_err();
        assert!((err.as_secs_f64() - 1.0).abs() < 1e-6);
    }
}
