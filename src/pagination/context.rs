//! Request Context
//!
//! Cancellation token plus optional deadline carried by every `*_with`
//! engine call. The guarded work is dropped as soon as either fires, which
//! drops the adapter future and abandons the store query.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Per-request cancellation and deadline
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Fires when the caller abandons the request
    pub cancel: CancellationToken,
    /// Absolute deadline, if any
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Context that never cancels and has no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token (e.g. a child of a session token)
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Whether the context has already been cancelled or timed out
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `work` unless the token fires or the deadline passes first.
    pub async fn guard<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded),
            result = work => result,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
