//! Timeout decorator for commits.
//!
//! Bounds every commit invocation by handing the inner commit a context that
//! expires after a fixed duration.

use std::time::Duration;

use async_trait::async_trait;
use opbatch_core::{Commit, Context, Operations};
use tower::Layer;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps commits with a per-invocation deadline.
///
/// The derived context is the earlier of the batcher's own context and
/// `timeout` from the start of the commit. A zero timeout hands the inner
/// commit an already-expired context.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<C> Layer<C> for TimeoutLayer {
    type Service = TimeoutCommit<C>;

    fn layer(&self, inner: C) -> Self::Service {
        TimeoutCommit {
            inner,
            timeout: self.timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutCommit
// ---------------------------------------------------------------------------

/// Commit wrapper that enforces a deadline on the inner commit.
#[derive(Debug, Clone)]
pub struct TimeoutCommit<C> {
    inner: C,
    timeout: Duration,
}

#[async_trait]
impl<T, R, C> Commit<T, R> for TimeoutCommit<C>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    C: Commit<T, R>,
{
    async fn commit(&self, ctx: &Context, ops: &mut Operations<T, R>) {
        let bounded = ctx.with_timeout(self.timeout);
        self.inner.commit(&bounded, ops).await;
        // Releases anything the inner commit left running on the derived context.
        bounded.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use opbatch_core::{BatchError, Operation};
    use tokio::time::Instant;

    use super::*;

    /// Commit that takes a configurable delay, giving up when its context ends.
    struct SlowCommit {
        delay: Duration,
    }

    #[async_trait]
    impl Commit<u32, u32> for SlowCommit {
        async fn commit(&self, ctx: &Context, ops: &mut Operations<u32, u32>) {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => ops.resolve_each(|v| Ok(*v)),
                err = ctx.done() => {
                    ops.resolve_remaining(&err);
                }
            }
        }
    }

    fn group() -> Operations<u32, u32> {
        vec![Operation::new(1), Operation::new(2)].into()
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_timeout() {
        let commit = TimeoutLayer::new(Duration::from_secs(1)).layer(SlowCommit {
            delay: Duration::from_millis(10),
        });
        let mut ops = group();
        commit.commit(&Context::background(), &mut ops).await;
        assert_eq!(ops.get(1).unwrap().outcome().unwrap().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exceeds_timeout_resolves_with_deadline_error() {
        let commit = TimeoutLayer::new(Duration::from_millis(50)).layer(SlowCommit {
            delay: Duration::from_millis(200),
        });
        let mut ops = group();

        let start = Instant::now();
        commit.commit(&Context::background(), &mut ops).await;
        assert!(start.elapsed() < Duration::from_millis(200));
        assert!(ops
            .iter()
            .all(|op| matches!(op.outcome(), Some(Err(BatchError::DeadlineExceeded)))));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_deadline_is_never_extended() {
        let commit = TimeoutLayer::new(Duration::from_secs(60)).layer(SlowCommit {
            delay: Duration::from_secs(1),
        });
        let parent = Context::background().with_timeout(Duration::from_millis(5));
        let mut ops = group();
        commit.commit(&parent, &mut ops).await;
        assert!(matches!(
            ops.get(0).unwrap().outcome(),
            Some(Err(BatchError::DeadlineExceeded))
        ));
    }

    #[tokio::test]
    async fn canceled_parent_propagates() {
        let commit = TimeoutLayer::new(Duration::from_secs(60)).layer(SlowCommit {
            delay: Duration::from_secs(60),
        });
        let parent = Context::background();
        parent.cancel();
        let mut ops = group();
        commit.commit(&parent, &mut ops).await;
        assert!(matches!(
            ops.get(0).unwrap().outcome(),
            Some(Err(BatchError::Canceled))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_does_not_bound_the_commit() {
        let commit = TimeoutLayer::new(Duration::MAX).layer(SlowCommit {
            delay: Duration::from_millis(10),
        });
        let mut ops = group();
        commit.commit(&Context::background(), &mut ops).await;
        assert_eq!(ops.get(0).unwrap().outcome().unwrap().unwrap(), 1);
        assert_eq!(ops.get(1).unwrap().outcome().unwrap().unwrap(), 2);
    }
}
