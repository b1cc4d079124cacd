//! Cancellation and deadline for background fan-out work.
//!
//! A [`FanoutScope`] is detached from the HTTP request that spawned it. It
//! ends when its deadline passes or when the parent token (the process
//! shutdown token) is cancelled, whichever comes first.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope stopped work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation token plus deadline.
#[derive(Debug, Clone)]
pub struct FanoutScope {
    token: CancellationToken,
    deadline: Instant,
}

impl FanoutScope {
    /// A scope that ends `timeout` from now or when `parent` is cancelled.
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    /// A scope with no parent.
    pub fn detached(timeout: Duration) -> Self {
        Self::with_timeout(&CancellationToken::new(), timeout)
    }

    /// Cancel this scope only. The parent is unaffected.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// `Err` once the scope is over. Cancellation wins over the deadline.
    pub fn check(&self) -> Result<(), ScopeError> {
        if self.token.is_cancelled() {
            Err(ScopeError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(ScopeError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early with an error if the scope ends.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ScopeError> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Drive `fut` to completion unless the scope ends first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ScopeError> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ScopeError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(ScopeError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
