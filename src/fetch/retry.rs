use std::future::Future;

use crate::classify::ClassifiedError;
use crate::throttle::{Backoff, RateLimiter};
use crate::upstream::UpstreamError;

/// Default number of attempts per upstream request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How often and how patiently one operation is retried
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
        }
    }
}

/// Runs upstream operations under the shared rate limiter and retry policy.
///
/// Every attempt first waits for the limiter. Failures are classified here and
/// nowhere else; a non-retryable classification ends the run immediately.
pub struct RetryExecutor<'a> {
    limiter: &'a RateLimiter,
    policy: &'a RetryPolicy,
    attempts: u32,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(limiter: &'a RateLimiter, policy: &'a RetryPolicy) -> Self {
        Self {
            limiter,
            policy,
            attempts: 0,
        }
    }

    /// Total upstream calls made through this executor so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn run<T, F, Fut>(&mut self, label: &str, mut operation: F) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;

        loop {
            self.limiter.acquire().await;
            self.attempts += 1;
            attempt += 1;

            let raw = match operation().await {
                Ok(value) => return Ok(value),
                Err(raw) => raw,
            };

            let error = ClassifiedError::from(raw);
            if !error.retryable {
                tracing::debug!("{} failed ({}), not retrying", label, error.kind);
                return Err(error);
            }
            if attempt >= max_attempts {
                tracing::warn!("{} failed after {} attempts: {}", label, attempt, error);
                return Err(error);
            }

            let delay = self.policy.backoff.compute(attempt - 1);
            tracing::info!(
                "{} failed ({}), retrying in {:.1}s (attempt {}/{})",
                label,
                error.kind,
                delay.as_secs_f64(),
                attempt + 1,
                max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::upstream::RawErrorType;
    use std::cell::Cell;
    use std::time::Duration;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Backoff::new(Duration::from_secs(1), Duration::ZERO),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_until_success() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let policy = policy(3);
        let mut executor = RetryExecutor::new(&limiter, &policy);
        let calls = Cell::new(0);

        let result = executor
            .run("test", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(UpstreamError::new(RawErrorType::Http, "connection reset"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(executor.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_budget() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let policy = policy(3);
        let mut executor = RetryExecutor::new(&limiter, &policy);
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = executor
            .run("test", || async {
                Err(UpstreamError::new(RawErrorType::Http, "HTTP Error 429: Too Many Requests"))
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::RateLimited);
        assert_eq!(executor.attempts(), 3);
        // 1s + 2s of backoff between the three attempts
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let policy = policy(3);
        let mut executor = RetryExecutor::new(&limiter, &policy);

        let result: Result<(), _> = executor
            .run("test", || async { Err(UpstreamError::new(RawErrorType::Process, "Private video")) })
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Private);
        assert_eq!(executor.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_run_gets_its_own_budget() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let policy = policy(2);
        let mut executor = RetryExecutor::new(&limiter, &policy);

        for language in ["en", "fr"] {
            let result: Result<(), _> = executor
                .run(language, || async {
                    Err(UpstreamError::new(RawErrorType::Http, "connection reset"))
                })
                .await;
            assert!(result.is_err());
        }

        // two requests, two attempts each
        assert_eq!(executor.attempts(), 4);
    }
}
