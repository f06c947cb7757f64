//! Retry helper for transient session-construction failures.

use std::future::Future;
use std::time::Duration;

use crate::{Context, Error, Result, TRACING_TARGET_RETRY};

/// Backoff schedule for retrying a failed call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 means no retries)
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single backoff
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            ..Default::default()
        }
    }

    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Set the maximum backoff duration.
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let millis = (self.initial_backoff.as_millis() as f64)
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the retries are exhausted.
    ///
    /// Cancelling `ctx` interrupts both the running attempt and any backoff
    /// sleep.
    pub async fn retry<F, Fut, T>(&self, ctx: &Context, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match ctx.run(operation, call()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                tracing::debug!(
                    target: TRACING_TARGET_RETRY,
                    operation,
                    attempt = attempt + 1,
                    error = %err,
                    "giving up"
                );
                return Err(err);
            }

            let backoff = self.backoff(attempt);
            tracing::debug!(
                target: TRACING_TARGET_RETRY,
                operation,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "retrying after backoff"
            );
            ctx.run(operation, async {
                tokio::time::sleep(backoff).await;
                Ok::<_, Error>(())
            })
            .await?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(300));
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = RetryPolicy::default()
            .retry(&Context::new(), "lookup", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::session("flaky").with_retryable(true))
                    } else {
                        Ok("us-west-2")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "us-west-2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryPolicy::default()
            .retry(&Context::new(), "lookup", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::session("access denied"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Session);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryPolicy::new(2, Duration::from_millis(10))
            .retry(&Context::new(), "lookup", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::session("throttled").with_retryable(true))
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_context_stops_backoff() {
        let ctx = Context::new();
        ctx.cancel();

        let err = RetryPolicy::default()
            .retry(&ctx, "lookup", || async { Ok::<_, Error>(1) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
