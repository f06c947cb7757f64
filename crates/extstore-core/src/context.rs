//! Cancellation-aware call context.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Carries a cancellation signal and an optional deadline into every storage
/// call.
///
/// Cloning a context shares its cancellation token, so cancelling any clone
/// aborts calls running under all of them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a context that is never cancelled unless [`cancel`](Self::cancel)
    /// is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an absolute deadline for calls made under this context.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancels every call running under this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the context has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the context's own deadline, if any.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs `fut` until it completes, the context is cancelled, or the
    /// context deadline passes.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => self.race(operation, deadline, None, fut).await,
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::cancelled(operation)),
                res = fut => res,
            },
        }
    }

    /// Runs `fut` under `timeout` and the context's own deadline, whichever
    /// is earlier.
    ///
    /// A zero `timeout` disables the per-operation bound and leaves only the
    /// context's deadline and cancellation in effect.
    pub async fn run_with_timeout<F, T>(&self, operation: &str, timeout: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if timeout.is_zero() {
            return self.run(operation, fut).await;
        }

        let op_deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(ctx_deadline) if ctx_deadline < op_deadline => ctx_deadline,
            _ => op_deadline,
        };
        self.race(operation, deadline, Some(timeout), fut).await
    }

    async fn race<F, T>(
        &self,
        operation: &str,
        deadline: Instant,
        timeout: Option<Duration>,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled(operation)),
            res = tokio::time::timeout_at(deadline, fut) => match res {
                Ok(res) => res,
                Err(_) => Err(Error::timeout(
                    operation,
                    timeout.unwrap_or_else(|| deadline.saturating_duration_since(started)),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn completes_within_timeout() {
        let ctx = Context::new();
        let value = ctx
            .run_with_timeout("op", Duration::from_secs(5), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let ctx = Context::new();
        let err = ctx
            .run_with_timeout("slow op", Duration::from_millis(50), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("slow op"));
    }

    #[tokio::test(start_paused = true)]
    async fn context_deadline_wins_when_earlier() {
        let ctx = Context::new().with_timeout(Duration::from_millis(10));
        let err = ctx
            .run_with_timeout("op", Duration::from_secs(600), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn cancellation_aborts_promptly() {
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = ctx
            .run_with_timeout("op", Duration::ZERO, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
