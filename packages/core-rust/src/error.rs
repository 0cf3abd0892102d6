use std::sync::Arc;

/// Errors surfaced by submission, waiting, the run loop and commit routines.
///
/// `Clone` so that a single resolved outcome can be observed by any number of
/// waiters; user commit failures are shared behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchError {
    #[error("batcher is closed")]
    Closed,
    #[error("batcher run loop has already been started and cannot be restarted")]
    NotRestartable,
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("commit panicked before resolving the operation")]
    CommitPanicked,
    #[error("commit returned without resolving the operation")]
    Unresolved,
    #[error("commit failed: {0}")]
    Commit(Arc<anyhow::Error>),
}

impl BatchError {
    /// Wraps a failure raised inside a commit routine.
    pub fn commit(err: impl Into<anyhow::Error>) -> Self {
        Self::Commit(Arc::new(err.into()))
    }

    /// True for the two ways a [`crate::Context`] can end.
    #[must_use]
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}
