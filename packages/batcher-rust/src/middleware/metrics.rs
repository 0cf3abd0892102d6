//! Metrics decorator for commits.
//!
//! Records commit duration, group size and outcome in a `tracing` span and
//! through the `metrics` facade. Without an installed recorder the `metrics`
//! calls are no-ops.

use std::time::Instant;

use async_trait::async_trait;
use opbatch_core::{Commit, Context, Operations};
use tower::Layer;
use tracing::{info_span, Instrument};

/// Counter of commit invocations, labelled by `outcome`.
pub const COMMITS_TOTAL: &str = "opbatch_commits_total";
/// Histogram of commit wall-clock duration in seconds.
pub const COMMIT_DURATION_SECONDS: &str = "opbatch_commit_duration_seconds";
/// Histogram of group sizes handed to the commit.
pub const GROUP_SIZE: &str = "opbatch_group_size";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments commits with timing and outcome.
#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer;

impl<C> Layer<C> for MetricsLayer {
    type Service = MetricsCommit<C>;

    fn layer(&self, inner: C) -> Self::Service {
        MetricsCommit { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsCommit
// ---------------------------------------------------------------------------

/// Commit wrapper that records duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsCommit<C> {
    inner: C,
}

/// How a group came out of the inner commit.
fn classify<T, R>(ops: &Operations<T, R>) -> &'static str {
    if ops.unresolved().next().is_some() {
        "unresolved"
    } else if ops.iter().any(|op| op.is_err()) {
        "error"
    } else {
        "ok"
    }
}

#[async_trait]
impl<T, R, C> Commit<T, R> for MetricsCommit<C>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    C: Commit<T, R>,
{
    async fn commit(&self, ctx: &Context, ops: &mut Operations<T, R>) {
        let size = ops.len();
        let span = info_span!(
            "commit",
            size = size,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            self.inner.commit(ctx, ops).await;
            let elapsed = start.elapsed();
            let outcome = classify(ops);

            let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);

            metrics::counter!(COMMITS_TOTAL, "outcome" => outcome).increment(1);
            metrics::histogram!(COMMIT_DURATION_SECONDS).record(elapsed.as_secs_f64());
            #[allow(clippy::cast_precision_loss)]
            let size_f64 = size as f64;
            metrics::histogram!(GROUP_SIZE).record(size_f64);

            tracing::debug!(size, duration_ms, outcome, "commit complete");
        }
        .instrument(span)
        .await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use opbatch_core::{commit_fn, BatchError, Operation};

    use super::*;

    fn group(values: &[u32]) -> Operations<u32, u32> {
        values.iter().copied().map(Operation::new).collect()
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_results() {
        let commit = MetricsLayer.layer(commit_fn(
            |_ctx: Context, ops: Operations<u32, u32>| async move {
                ops.resolve_each(|v| Ok(v * 3));
            },
        ));

        let mut ops = group(&[1, 2]);
        commit.commit(&Context::background(), &mut ops).await;
        assert_eq!(ops.get(1).unwrap().outcome().unwrap().unwrap(), 6);
        assert_eq!(classify(&ops), "ok");
    }

    #[test]
    fn outcome_classifies_groups() {
        let ops = group(&[1, 2]);
        assert_eq!(classify(&ops), "unresolved");

        ops.get(0).unwrap().resolve(1);
        ops.get(1)
            .unwrap()
            .resolve_err(BatchError::commit(anyhow::anyhow!("rejected")));
        assert_eq!(classify(&ops), "error");
    }
}
