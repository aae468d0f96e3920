//! Per-request cancellation and deadline handling.

use std::future::{Future, pending};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("request was cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal shared by every store and cache call made on behalf of
/// one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `operation` until it completes or the context is cancelled,
    /// whichever comes first. A cancelled operation is dropped.
    pub async fn run<F, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ContextError>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ContextError::Cancelled.into()),
            _ = deadline => Err(ContextError::DeadlineExceeded.into()),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Failed(ContextError);

    impl From<ContextError> for Failed {
        fn from(error: ContextError) -> Self {
            Self(error)
        }
    }

    #[tokio::test]
    async fn run_returns_operation_result() {
        let ctx = RequestContext::new();
        let value: Result<u8, Failed> = ctx.run(async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = RequestContext::new();
        ctx.cancel();
        let value: Result<u8, Failed> = ctx.run(async { Ok(7) }).await;
        assert_eq!(value, Err(Failed(ContextError::Cancelled)));
        assert_eq!(ctx.check(), Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_pending_operation() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let value: Result<u8, Failed> = ctx.run(pending::<Result<u8, Failed>>()).await;
        assert_eq!(value, Err(Failed(ContextError::DeadlineExceeded)));
    }
}
