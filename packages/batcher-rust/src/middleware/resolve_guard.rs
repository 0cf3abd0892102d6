//! Resolve-every-member guard for commits.
//!
//! Commits are obliged to resolve every operation they receive. This
//! decorator enforces that after the fact: whatever the inner commit left
//! unresolved is resolved with the commit context's error, or with
//! `BatchError::Unresolved` while the context is still live.

use async_trait::async_trait;
use opbatch_core::{BatchError, Commit, Context, Operations};
use tower::Layer;
use tracing::warn;

// ---------------------------------------------------------------------------
// ResolveGuardLayer
// ---------------------------------------------------------------------------

/// Tower layer that resolves members an inner commit forgot.
#[derive(Debug, Clone, Copy)]
pub struct ResolveGuardLayer;

impl<C> Layer<C> for ResolveGuardLayer {
    type Service = ResolveGuard<C>;

    fn layer(&self, inner: C) -> Self::Service {
        ResolveGuard { inner }
    }
}

// ---------------------------------------------------------------------------
// ResolveGuard
// ---------------------------------------------------------------------------

/// Commit wrapper that never returns with an unresolved member.
#[derive(Debug, Clone)]
pub struct ResolveGuard<C> {
    inner: C,
}

#[async_trait]
impl<T, R, C> Commit<T, R> for ResolveGuard<C>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    C: Commit<T, R>,
{
    async fn commit(&self, ctx: &Context, ops: &mut Operations<T, R>) {
        self.inner.commit(ctx, ops).await;

        let err = ctx.err().unwrap_or(BatchError::Unresolved);
        let resolved = ops.resolve_remaining(&err);
        if resolved > 0 {
            warn!(
                resolved,
                size = ops.len(),
                reason = %err,
                "commit left operations unresolved"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
