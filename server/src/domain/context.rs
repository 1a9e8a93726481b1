//! Deadline-bound request context

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a context finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    DeadlineExceeded,
    Cancelled,
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoneReason::DeadlineExceeded => f.write_str("deadline exceeded"),
            DoneReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Deadline plus cancellation token handed to every collaborator of one
/// request. Cloning is cheap; clones share the same token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    token: CancellationToken,
}

impl RequestContext {
    /// Create a context that expires after `timeout`.
    ///
    /// The returned guard cancels the context's token when dropped, so
    /// holding it for the lifetime of the request releases the context on
    /// every exit path. Server shutdown does not cancel it; in-flight
    /// requests drain under their own deadline.
    pub fn with_timeout(timeout: Duration) -> (Self, DropGuard) {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        let ctx = Self {
            deadline: Instant::now() + timeout,
            token,
        };
        (ctx, guard)
    }

    /// Non-blocking check, for loops that poll between units of work
    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.token.is_cancelled() {
            Some(DoneReason::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(DoneReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the deadline passes or the token is cancelled
    pub async fn done(&self) -> DoneReason {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => DoneReason::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => DoneReason::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));

        assert_eq!(ctx.done_reason(), None);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(ctx.done_reason(), None);

        assert_eq!(ctx.done().await, DoneReason::DeadlineExceeded);
        assert_eq!(ctx.done_reason(), Some(DoneReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_guard_cancels_on_drop() {
        let (ctx, guard) = RequestContext::with_timeout(Duration::from_secs(60));
        let clone = ctx.clone();

        drop(guard);
        assert_eq!(clone.done_reason(), Some(DoneReason::Cancelled));
        assert_eq!(clone.done().await, DoneReason::Cancelled);
    }

    #[tokio::test]
    async fn test_contexts_are_independent() {
        let (first, first_guard) = RequestContext::with_timeout(Duration::from_secs(60));
        let (second, _second_guard) = RequestContext::with_timeout(Duration::from_secs(60));

        drop(first_guard);
        assert_eq!(first.done_reason(), Some(DoneReason::Cancelled));
        assert_eq!(second.done_reason(), None);
    }
}
