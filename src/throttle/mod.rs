//! Process-wide request pacing and retry backoff.
//!
//! A single [`RateLimiter`] is created at startup and shared by `Arc` with every
//! component that talks to the upstream service. It bounds the aggregate request
//! rate of the process, not the rate per video.

use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Default spacing between any two upstream requests
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Default)]
struct RateState {
    last_request_at: Option<Instant>,
}

/// Enforces a minimum interval between upstream requests across all callers
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    state: Mutex<RateState>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(RateState::default()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `min_interval` has passed since the previous request, then claim
    /// the slot. The lock is held while waiting, so callers are served one by one
    /// in arrival order.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_request_at {
            let ready_at = last + self.min_interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    "Rate limiter waiting {:?} before next request",
                    ready_at - Instant::now()
                );
                sleep_until(ready_at).await;
            }
        }

        let now = Instant::now();
        state.last_request_at = Some(match state.last_request_at {
            Some(last) if last > now => last,
            _ => now,
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

/// Calculate the deterministic part of a retry delay: `base * 2^attempt`
pub fn retry_delay(attempt: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(attempt);
    base.saturating_mul(multiplier)
}

/// Exponential backoff with additive random jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// `base * 2^attempt + uniform(0, jitter)`. Does not sleep.
    pub fn compute(&self, attempt: u32) -> Duration {
        let fraction: f64 = rand::thread_rng().gen_range(0.0..1.0);
        retry_delay(attempt, self.base).saturating_add(self.jitter.mul_f64(fraction))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_retry_delay_basic() {
        let base = Duration::from_millis(100);

        assert_eq!(retry_delay(0, base), Duration::from_millis(100));
        assert_eq!(retry_delay(1, base), Duration::from_millis(200));
        assert_eq!(retry_delay(2, base), Duration::from_millis(400));
        assert_eq!(retry_delay(3, base), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_delay_overflow_protection() {
        let base = Duration::from_secs(u64::MAX / 2);
        assert!(retry_delay(40, base) > Duration::from_secs(0));
    }

    #[test]
    fn test_backoff_within_jitter_window() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));

        for attempt in 0..6 {
            let floor = Duration::from_secs(2) * 2_u32.pow(attempt);
            for _ in 0..50 {
                let delay = backoff.compute(attempt);
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
                assert!(delay < floor + Duration::from_secs(1));
            }
        }
    }

    #[test]
    fn test_backoff_without_jitter_is_exact() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::ZERO);
        assert_eq!(backoff.compute(2), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();

        limiter.acquire().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_acquires_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();

        for _ in 0..4 {
            limiter.acquire().await;
        }

        assert!(start.elapsed() >= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_share_one_budget() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(3)));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(start.elapsed() >= Duration::from_secs(12));
        for pair in finished.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_counts_toward_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(3));
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        let before = Instant::now();
        limiter.acquire().await;

        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
