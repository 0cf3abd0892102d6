//! `opbatch` — size- and age-triggered operation batching on tokio.
//!
//! Callers [`Batcher::submit`] values and [`Operation::wait`] on the returned
//! handles; a single run loop groups them and flushes each group to one
//! [`Commit`] invocation.

pub mod batch;
pub mod middleware;

pub use batch::{Batcher, BatcherConfig, BatcherState};
pub use middleware::{build_commit_pipeline, PipelineConfig};
pub use opbatch_core::{commit_fn, BatchError, Commit, Context, FnCommit, Operation, Operations};
