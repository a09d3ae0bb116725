//! Retry policy for transient network failures.

use crate::transport::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::warn;

/// How many times to attempt a request and how long to wait in between.
///
/// The delay schedule is fixed at construction, so a policy is a plain value
/// that can be injected into the client and inspected in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

    /// Exponential backoff doubling from `initial_delay`, capped at
    /// `max_delay`, for a total of `max_attempts` attempts.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        // ExponentialBackoff yields base^n * factor; base 2 doubles each step.
        let factor = (initial_delay.as_millis() as u64 / 2).max(1);
        let delays = ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(max_delay)
            .take(max_attempts.saturating_sub(1) as usize)
            .collect();
        Self { delays }
    }

    /// An explicit delay schedule; attempts = delays + 1.
    pub fn from_delays(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Run `action`, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, url: &str, action: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 1;
        let max = self.max_attempts();
        RetryIf::start(self.delays.iter().copied(), action, |e: &TransportError| {
            let retry = e.is_transient() && attempt < max;
            if retry {
                warn!(url, attempt, max_attempts = max, "Retrying after transient error: {}", e);
            }
            attempt += 1;
            retry
        })
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(
            Self::DEFAULT_MAX_ATTEMPTS,
            Self::DEFAULT_INITIAL_DELAY,
            Self::DEFAULT_MAX_DELAY,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn timeout() -> TransportError {
        TransportError::Timeout {
            url: "mem://x".into(),
        }
    }

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(
            policy.delays(),
            &[Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn test_schedule_is_capped() {
        let policy =
            RetryPolicy::exponential(6, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.delays().last(), Some(&Duration::from_millis(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicUsize::new(0);
        let start = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .run("mem://x", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(timeout())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run("mem://x", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(timeout())
            })
            .await;

        assert!(matches!(result, Err(TransportError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_not_retried() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run("mem://x", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Status {
                    url: "mem://x".into(),
                    status: 401,
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_injected_schedule() {
        let policy = RetryPolicy::from_delays([Duration::ZERO; 4]);
        assert_eq!(policy.max_attempts(), 5);
        let calls = &AtomicUsize::new(0);
        let _ = policy
            .run("mem://x", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(timeout())
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
