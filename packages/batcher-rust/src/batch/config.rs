//! Construction-time parameters for a [`super::Batcher`].

use std::time::Duration;

use tokio::sync::Semaphore;

/// Triggers and intake sizing for a batcher.
///
/// Both triggers are independently optional. With neither set, groups only
/// flush when the run loop shuts down.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Flush as soon as a group holds this many operations. 0 disables the size trigger.
    pub max_size: usize,
    /// Flush once the first member of a group is this old. Zero disables the age trigger.
    pub max_age: Duration,
    /// Bounded mpsc channel capacity between submitters and the run loop.
    /// Values below 1 are treated as 1, and values above
    /// [`tokio::sync::Semaphore::MAX_PERMITS`] are clamped to it, so
    /// `usize::MAX` asks for the largest queue tokio supports.
    pub queue_capacity: usize,
}

impl BatcherConfig {
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub(crate) fn size_trigger(&self) -> Option<usize> {
        (self.max_size > 0).then_some(self.max_size)
    }

    pub(crate) fn intake_capacity(&self) -> usize {
        self.queue_capacity.clamp(1, Semaphore::MAX_PERMITS)
    }

    pub(crate) fn age_trigger(&self) -> Option<Duration> {
        (!self.max_age.is_zero()).then_some(self.max_age)
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_size: 0,
            max_age: Duration::ZERO,
            queue_capacity: 256,
        }
    }
}
