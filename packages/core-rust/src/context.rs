use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::BatchError;

/// Cancellation scope carried through submit, wait, run and commit calls.
///
/// A context ends when its token is canceled (directly or through a parent)
/// or when its deadline passes. Children derived with [`Context::child`],
/// [`Context::with_timeout`] or [`Context::with_deadline`] end whenever their
/// parent ends; canceling a child never affects the parent.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A root context with no deadline. It only ends through [`Context::cancel`].
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a child that ends when `self` ends or when it is canceled itself.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child whose deadline is the earlier of `deadline` and the
    /// parent's own deadline.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent <= deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child that expires `timeout` from now.
    ///
    /// A timeout too large to represent as an instant adds no deadline of its
    /// own; the child then ends only with its parent or through cancellation.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, saturating at zero. `None` without a deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the context ended, or `None` while it is still live.
    ///
    /// Cancellation is reported in preference to an elapsed deadline.
    #[must_use]
    pub fn err(&self) -> Option<BatchError> {
        if self.token.is_cancelled() {
            return Some(BatchError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(BatchError::DeadlineExceeded),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context ends, yielding the reason.
    pub async fn done(&self) -> BatchError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => BatchError::Canceled,
                () = tokio::time::sleep_until(deadline) => BatchError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                BatchError::Canceled
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_live() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn cancel_propagates_to_children_only() {
        let parent = Context::background();
        let child = parent.child();
        let sibling = parent.child();

        child.cancel();
        assert!(matches!(child.err(), Some(BatchError::Canceled)));
        assert!(parent.err().is_none());
        assert!(sibling.err().is_none());

        parent.cancel();
        assert!(matches!(sibling.err(), Some(BatchError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        assert!(!ctx.is_done());

        let start = Instant::now();
        let err = ctx.done().await;
        assert!(matches!(err, BatchError::DeadlineExceeded));
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_earlier_parent_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(5));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(1));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[tokio::test]
    async fn cancel_wins_over_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_secs(60));
        ctx.cancel();
        assert!(matches!(ctx.done().await, BatchError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_adds_no_deadline() {
        let ctx = Context::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());

        let parent = Context::background().with_timeout(Duration::from_millis(5));
        let child = parent.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());

        parent.cancel();
        assert!(matches!(child.err(), Some(BatchError::Canceled)));
    }

    #[test]
    fn zero_timeout_is_already_done() {
        let ctx = Context::background().with_timeout(Duration::ZERO);
        assert!(matches!(ctx.err(), Some(BatchError::DeadlineExceeded)));
    }
}
