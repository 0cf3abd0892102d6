//! Tower layers that decorate a [`opbatch_core::Commit`].
//!
//! - [`timeout`]: Per-invocation commit deadline
//! - [`metrics`]: Commit timing, size and outcome via `tracing` spans and `metrics`
//! - [`resolve_guard`]: Resolves members a commit left unresolved
//! - [`pipeline`]: Composes all layers into a single commit stack

pub mod metrics;
pub mod pipeline;
pub mod resolve_guard;
pub mod timeout;

pub use metrics::MetricsLayer;
pub use pipeline::{build_commit_pipeline, PipelineConfig};
pub use resolve_guard::ResolveGuardLayer;
pub use timeout::TimeoutLayer;
