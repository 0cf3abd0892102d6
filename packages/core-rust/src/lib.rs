//! `opbatch` Core — operations, operation groups, cancellation contexts and
//! the commit capability a batcher flushes groups into.

pub mod context;
pub mod error;
pub mod operation;
pub mod operations;
pub mod traits;

pub use context::Context;
pub use error::BatchError;
pub use operation::Operation;
pub use operations::Operations;
pub use traits::{commit_fn, Commit, FnCommit};
