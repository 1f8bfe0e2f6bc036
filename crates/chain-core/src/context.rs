//! Call Context
//!
//! Cancellation, deadline and trace id propagated through every call boundary
//! (model call, chain call, tool call, event emission).

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ChainError, Result};

/// Per-invocation context, cheap to clone
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    trace_id: Option<String>,
}

impl Context {
    /// A fresh context with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Context tagged with a random trace id
    pub fn traced() -> Self {
        Self::new().with_trace_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Child context, cancelled with its parent but cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            trace_id: self.trace_id.clone(),
        }
    }

    /// Child context whose deadline is at most `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        });
        child
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if the context is already done
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(ChainError::Cancelled);
        }
        if self.deadline_passed() {
            return Err(ChainError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ChainError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => ChainError::Cancelled,
                () = tokio::time::sleep_until(deadline) => ChainError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ChainError::Cancelled
            }
        }
    }

    /// Drive `fut` to completion unless the context finishes first.
    ///
    /// On cancellation the future is dropped, which releases whatever it holds.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}
