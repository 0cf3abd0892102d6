//! The batching engine.
//!
//! 1. **Intake** (`Batcher::submit`): callers hand values to the run loop
//! 2. **Run loop** (`Batcher::run`): accumulates groups until a size or age trigger fires
//! 3. **Dispatch**: frozen groups go to the [`opbatch_core::Commit`], one at a time

mod batcher;
pub mod config;
mod state;

pub use batcher::Batcher;
pub use config::BatcherConfig;
pub use state::BatcherState;
