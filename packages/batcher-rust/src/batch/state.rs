//! Run-loop state published lock-free for observers.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// Where the run loop currently is.
///
/// State machine: Idle -> Accumulating -> Flushing -> Idle | Accumulating,
/// and any state -> Stopped once the run context ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    /// No pending operations and no armed timer.
    Idle,
    /// At least one operation is waiting in the live group.
    Accumulating,
    /// A frozen group is being committed.
    Flushing,
    /// The run loop has terminated. Terminal.
    Stopped,
}

impl BatcherState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Accumulating => "accumulating",
            Self::Flushing => "flushing",
            Self::Stopped => "stopped",
        }
    }
}

/// Shared, cheaply readable cell holding the current [`BatcherState`].
///
/// Only the run loop writes it; `Stopped` is never left once entered.
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    state: Arc<ArcSwap<BatcherState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(ArcSwap::from_pointee(BatcherState::Idle)),
        }
    }

    pub(crate) fn get(&self) -> BatcherState {
        **self.state.load()
    }

    pub(crate) fn set(&self, next: BatcherState) {
        self.state.rcu(|current| {
            if **current == BatcherState::Stopped {
                Arc::clone(current)
            } else {
                Arc::new(next)
            }
        });
    }
}
