//! Scheduler abstraction
//!
//! Effects that defer work (`delay`, `receive_on`) do so on a [`Scheduler`].
//! Production code hands the environment a real-clock scheduler; tests hand it
//! a virtual clock that only moves when the test advances it. Reducers never
//! know the difference.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// A unit of work run once when its timer fires
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work run every time a repeating timer fires
pub type RepeatingJob = Box<dyn FnMut() + Send + 'static>;

/// Shared handle to a scheduler, as stored in environments and effects
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Errors raised while constructing schedulers
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A real-clock scheduler was requested outside of a Tokio runtime
    #[error("no Tokio runtime is available to drive the scheduler")]
    NoRuntime,
}

/// A clock that can run jobs at a later point in its own time.
///
/// Time is measured as the [`Duration`] elapsed since the scheduler was
/// created. Jobs scheduled for the same instant run in the order they were
/// registered.
pub trait Scheduler: Send + Sync {
    /// Current time on this scheduler's clock
    fn now(&self) -> Duration;

    /// Run `job` once, `after` from now
    fn schedule(&self, after: Duration, job: Job) -> TimerHandle;

    /// Run `job` first `after` from now, then every `interval`
    fn schedule_repeating(
        &self,
        after: Duration,
        interval: Duration,
        job: RepeatingJob,
    ) -> TimerHandle;
}

/// Cancellation handle for a scheduled job.
///
/// Clones share the same flag. Dropping a handle does not cancel the job.
#[derive(Clone, Debug, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Create a fresh, active handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent every future firing of the job
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_handle_clones_share_cancellation() {
        let handle = TimerHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());

        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
