//! A single submitted unit of work and its write-once outcome.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tracing::warn;

use crate::context::Context;
use crate::error::BatchError;

struct Inner<T, R> {
    value: T,
    outcome: OnceLock<Result<R, BatchError>>,
    // Flips to `true` exactly once, after `outcome` has been set.
    resolved: watch::Sender<bool>,
}

/// Shared handle to one submitted value awaiting its result.
///
/// The submitting caller and the group being committed each hold a clone.
/// The first call to [`Operation::resolve`] or [`Operation::resolve_err`]
/// decides the outcome; any later resolution is ignored and reported with a
/// warning, so waiters never observe a partially written outcome.
pub struct Operation<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Operation<T, R> {
    #[must_use]
    pub fn new(value: T) -> Self {
        let (resolved, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                value,
                outcome: OnceLock::new(),
                resolved,
            }),
        }
    }

    /// The submitted input value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.inner.value
    }

    /// Resolves the operation with a successful result.
    ///
    /// Returns `false` if the operation had already been resolved.
    pub fn resolve(&self, result: R) -> bool {
        self.complete(Ok(result))
    }

    /// Resolves the operation with an error.
    ///
    /// Returns `false` if the operation had already been resolved.
    pub fn resolve_err(&self, err: BatchError) -> bool {
        self.complete(Err(err))
    }

    fn complete(&self, outcome: Result<R, BatchError>) -> bool {
        if self.inner.outcome.set(outcome).is_err() {
            warn!("operation already resolved, ignoring repeated resolution");
            return false;
        }
        self.inner.resolved.send_replace(true);
        true
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// True once the operation has been resolved with an error.
    #[must_use]
    pub fn is_err(&self) -> bool {
        matches!(self.inner.outcome.get(), Some(Err(_)))
    }

    /// True when both handles refer to the same submitted operation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T, R: Clone> Operation<T, R> {
    /// Non-blocking peek at the outcome.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<R, BatchError>> {
        self.inner.outcome.get().cloned()
    }

    /// Waits until the operation is resolved or `ctx` ends, whichever is first.
    ///
    /// Giving up here does not withdraw the operation from its group: the
    /// commit still runs and still resolves it.
    ///
    /// # Errors
    ///
    /// Returns the error the operation was resolved with, or the context's
    /// error (`Canceled` / `DeadlineExceeded`) if `ctx` ended first.
    pub async fn wait(&self, ctx: &Context) -> Result<R, BatchError> {
        if let Some(outcome) = self.outcome() {
            return outcome;
        }

        let mut resolved = self.inner.resolved.subscribe();
        tokio::select! {
            biased;
            _ = resolved.wait_for(|done| *done) => {}
            err = ctx.done() => return Err(err),
        }

        self.outcome().unwrap_or(Err(BatchError::Unresolved))
    }
}

impl<T, R> Clone for Operation<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug, R> fmt::Debug for Operation<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("value", &self.inner.value)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
