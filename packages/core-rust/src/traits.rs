use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::operations::Operations;

/// The routine a batcher hands each flushed group to.
///
/// Implementations must resolve every operation in `ops` before returning,
/// on every path, including their own failures. When `ctx` ends they should
/// stop work and resolve whatever is outstanding with `ctx.err()`. Outside
/// of shutdown and panics, the batcher never resolves members a commit left
/// behind; their waiters hang until their own contexts end.
#[async_trait]
pub trait Commit<T, R>: Send + Sync + 'static {
    async fn commit(&self, ctx: &Context, ops: &mut Operations<T, R>);
}

#[async_trait]
impl<T, R, C> Commit<T, R> for Arc<C>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    C: Commit<T, R> + ?Sized,
{
    async fn commit(&self, ctx: &Context, ops: &mut Operations<T, R>) {
        (**self).commit(ctx, ops).await;
    }
}

#[async_trait]
impl<T, R, C> Commit<T, R> for Box<C>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    C: Commit<T, R> + ?Sized,
{
    async fn commit(&self, ctx: &Context, ops: &mut Operations<T, R>) {
        (**self).commit(ctx, ops).await;
    }
}

/// A [`Commit`] backed by an async closure. See [`commit_fn`].
#[derive(Debug, Clone)]
pub struct FnCommit<F> {
    f: F,
}

/// Adapts `Fn(Context, Operations<T, R>) -> impl Future<Output = ()>` into a
/// [`Commit`].
///
/// The closure receives owned clones of the context and the group; members
/// are shared handles, so resolving them through the clone is visible to
/// their waiters.
pub fn commit_fn<F>(f: F) -> FnCommit<F> {
    FnCommit { f }
}

#[async_trait]
impl<T, R, F, Fut> Commit<T, R> for FnCommit<F>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: Fn(Context, Operations<T, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn commit(&self, ctx: &Context, ops: &mut Operations<T, R>) {
        (self.f)(ctx.clone(), ops.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatchError;
    use crate::operation::Operation;

    struct Double;

    #[async_trait]
    impl Commit<u32, u32> for Double {
        async fn commit(&self, _ctx: &Context, ops: &mut Operations<u32, u32>) {
            ops.resolve_each(|v| Ok(v * 2));
        }
    }

    fn group(values: &[u32]) -> Operations<u32, u32> {
        values.iter().copied().map(Operation::new).collect()
    }

    #[tokio::test]
    async fn closure_commit_resolves_members() {
        let commit = commit_fn(|ctx: Context, ops: Operations<u32, u32>| async move {
            if let Some(err) = ctx.err() {
                ops.resolve_remaining(&err);
                return;
            }
            ops.resolve_each(|v| Ok(v + 1));
        });

        let mut ops = group(&[1, 2]);
        commit.commit(&Context::background(), &mut ops).await;
        let results: Vec<u32> = ops.iter().map(|op| op.outcome().unwrap().unwrap()).collect();
        assert_eq!(results, vec![2, 3]);

        let canceled = Context::background();
        canceled.cancel();
        let mut ops = group(&[1]);
        commit.commit(&canceled, &mut ops).await;
        assert!(matches!(
            ops.get(0).unwrap().outcome(),
            Some(Err(BatchError::Canceled))
        ));
    }

    #[tokio::test]
    async fn shared_and_boxed_commits_delegate() {
        let shared: Arc<dyn Commit<u32, u32>> = Arc::new(Double);
        let mut ops = group(&[4]);
        shared.commit(&Context::background(), &mut ops).await;
        assert_eq!(ops.get(0).unwrap().outcome().unwrap().unwrap(), 8);

        let boxed: Box<dyn Commit<u32, u32>> = Box::new(Double);
        let mut ops = group(&[5]);
        boxed.commit(&Context::background(), &mut ops).await;
        assert_eq!(ops.get(0).unwrap().outcome().unwrap().unwrap(), 10);
    }
}
