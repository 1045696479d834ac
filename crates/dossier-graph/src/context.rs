//! Cancellation and deadline context for network-facing operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::GraphError;

/// Carried into every store call. Cloning shares the cancellation token.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already cancelled or expired.
    pub fn check(&self) -> Result<(), GraphError> {
        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Err(GraphError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` unless the context is cancelled or its deadline passes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, GraphError>
    where
        F: Future<Output = Result<T, GraphError>>,
    {
        self.check()?;
        let expired = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GraphError::Cancelled),
            _ = expired => Err(GraphError::DeadlineExceeded),
            res = fut => res,
        }
    }

    /// Sleep for `delay`, waking early with an error on cancellation.
    pub async fn sleep(&self, delay: Duration) -> Result<(), GraphError> {
        self.run(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }
}
