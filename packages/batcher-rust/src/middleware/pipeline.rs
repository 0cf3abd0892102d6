//! Pipeline composition: combines the commit decorators into a single stack.

use std::time::Duration;

use opbatch_core::Commit;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use super::resolve_guard::ResolveGuardLayer;
use super::timeout::TimeoutLayer;

/// Settings for [`build_commit_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on a single commit invocation.
    pub commit_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_timeout: Duration::from_secs(30),
        }
    }
}

/// Wrap `commit` with the standard decorators.
///
/// Layer order (outermost to innermost):
/// 1. `TimeoutLayer` -- bound the commit by `commit_timeout`
/// 2. `ResolveGuardLayer` -- resolve leftovers, with the bounded context's error if it ended
/// 3. `MetricsLayer` -- record timing and outcome (closest to the actual commit)
///
/// The returned value is itself a [`Commit`] and can be handed to a batcher.
#[must_use]
pub fn build_commit_pipeline<T, R, C>(commit: C, config: &PipelineConfig) -> impl Commit<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    C: Commit<T, R>,
{
    ServiceBuilder::new()
        .layer(TimeoutLayer::new(config.commit_timeout))
        .layer(ResolveGuardLayer)
        .layer(MetricsLayer)
        .service(commit)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
