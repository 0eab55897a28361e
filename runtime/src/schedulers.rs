//! Production schedulers
//!
//! - [`TokioScheduler`]: real clock, jobs run on a Tokio runtime
//! - [`ImmediateScheduler`]: no clock at all, jobs run synchronously

use crate::lock;
use statecraft_core::{Job, RepeatingJob, Scheduler, SchedulerError, TimerHandle};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Smallest interval a repeating job may use
const MIN_INTERVAL: Duration = Duration::from_nanos(1);

/// Deadline used for delays too long to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

enum Kind {
    Once(Job),
    Repeating {
        interval: Duration,
        job: RepeatingJob,
    },
}

struct Scheduled {
    timer: TimerHandle,
    kind: Kind,
}

#[derive(Default)]
struct Queue {
    next_sequence: u64,
    scheduled: BTreeMap<(Instant, u64), Scheduled>,
}

/// Timers shared between the scheduler handles and the driver task
#[derive(Default)]
struct Timers {
    queue: Mutex<Queue>,
    wake: Notify,
}

impl Timers {
    fn insert(&self, after: Duration, kind: Kind) -> TimerHandle {
        let now = Instant::now();
        let deadline = now
            .checked_add(after)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let timer = TimerHandle::new();
        {
            let mut queue = lock(&self.queue);
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            queue.scheduled.insert(
                (deadline, sequence),
                Scheduled {
                    timer: timer.clone(),
                    kind,
                },
            );
        }
        // Stores a permit if the driver is busy, so the new deadline is not missed
        self.wake.notify_one();
        timer
    }

    /// Run every job that is due, in deadline then registration order.
    /// Returns the deadline of the earliest job left.
    fn fire_due(&self) -> Option<Instant> {
        lock(&self.queue)
            .scheduled
            .retain(|_, scheduled| !scheduled.timer.is_cancelled());
        loop {
            let due = {
                let mut queue = lock(&self.queue);
                let entry = queue.scheduled.first_entry()?;
                if entry.key().0 > Instant::now() {
                    return Some(entry.key().0);
                }
                entry.remove_entry()
            };

            let ((deadline, sequence), Scheduled { timer, kind }) = due;
            if timer.is_cancelled() {
                continue;
            }

            match kind {
                Kind::Once(job) => job(),
                Kind::Repeating { interval, mut job } => {
                    job();
                    if timer.is_cancelled() {
                        continue;
                    }
                    // Keeps its registration rank; a late driver catches up in a burst
                    if let Some(next) = deadline.checked_add(interval) {
                        lock(&self.queue).scheduled.insert(
                            (next, sequence),
                            Scheduled {
                                timer,
                                kind: Kind::Repeating { interval, job },
                            },
                        );
                    }
                },
            }
        }
    }

    async fn drive(self: Arc<Self>) {
        loop {
            match self.fire_due() {
                Some(deadline) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(deadline) => {},
                        () = self.wake.notified() => {},
                    }
                },
                None => self.wake.notified().await,
            }
        }
    }
}

/// Stops the driver once the last scheduler handle is gone
struct Driver {
    timers: Arc<Timers>,
    task: AbortHandle,
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A real-clock scheduler backed by a Tokio runtime.
///
/// `now` is the time elapsed since the scheduler was created. Every timer of
/// a scheduler (and of its clones) is fired by a single driver task, so jobs
/// due at the same instant run one after another in registration order. A
/// job's deadline is fixed when it is scheduled.
#[derive(Clone)]
pub struct TokioScheduler {
    driver: Arc<Driver>,
    origin: Instant,
}

impl TokioScheduler {
    /// Create a scheduler whose driver task runs on `handle`
    #[must_use]
    pub fn new(handle: &Handle) -> Self {
        let timers = Arc::new(Timers::default());
        let task = handle.spawn(Arc::clone(&timers).drive()).abort_handle();
        Self {
            driver: Arc::new(Driver { timers, task }),
            origin: Instant::now(),
        }
    }

    /// Create a scheduler on the runtime the caller is running in
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] when called outside a Tokio runtime.
    pub fn current() -> Result<Self, SchedulerError> {
        Handle::try_current()
            .map(|handle| Self::new(&handle))
            .map_err(|_| SchedulerError::NoRuntime)
    }

    /// Number of jobs waiting to fire
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.driver.timers.queue)
            .scheduled
            .values()
            .filter(|scheduled| !scheduled.timer.is_cancelled())
            .count()
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn schedule(&self, after: Duration, job: Job) -> TimerHandle {
        self.driver.timers.insert(after, Kind::Once(job))
    }

    fn schedule_repeating(
        &self,
        after: Duration,
        interval: Duration,
        job: RepeatingJob,
    ) -> TimerHandle {
        self.driver.timers.insert(
            after,
            Kind::Repeating {
                interval: interval.max(MIN_INTERVAL),
                job,
            },
        )
    }
}

/// A scheduler that runs every job synchronously, ignoring delays.
///
/// Useful for effects that should behave as if the clock did not exist. A
/// repeating job fires exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> Duration {
        Duration::ZERO
    }

    fn schedule(&self, _after: Duration, job: Job) -> TimerHandle {
        job();
        TimerHandle::new()
    }

    fn schedule_repeating(
        &self,
        _after: Duration,
        _interval: Duration,
        mut job: RepeatingJob,
    ) -> TimerHandle {
        job();
        TimerHandle::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[test]
    fn test_current_fails_outside_runtime() {
        assert!(matches!(
            TokioScheduler::current(),
            Err(SchedulerError::NoRuntime)
        ));
    }

    #[test]
    fn test_immediate_scheduler_runs_jobs_inline() {
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let _ = ImmediateScheduler.schedule(Duration::from_secs(60), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let c = Arc::clone(&counter);
        let _ = ImmediateScheduler.schedule_repeating(
            Duration::ZERO,
            Duration::from_secs(1),
            Box::new(move || {
                c.fetch_add(10, Ordering::SeqCst);
            }),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_after_delay() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let _ = scheduler.schedule(
            Duration::from_secs(5),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        tokio::time::timeout(Duration::from_secs(6), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.now() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_cancelled_timer_never_fires() {
        let scheduler = TokioScheduler::current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let timer = scheduler.schedule_repeating(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        timer.cancel();
        let fired = counter.load(Ordering::SeqCst);
        assert_eq!(fired, 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), fired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fixes_deadline_when_scheduled() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let clock = scheduler.clone();
        let _ = scheduler.schedule(
            Duration::from_secs(2),
            Box::new(move || {
                let _ = tx.send(clock.now());
            }),
        );
        tokio::time::advance(Duration::from_secs(1)).await;

        let fired_at = rx.await.unwrap();
        assert!(fired_at >= Duration::from_secs(2));
        assert!(fired_at < Duration::from_secs(3));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tokio_scheduler_runs_simultaneous_jobs_in_registration_order() {
        let scheduler = TokioScheduler::current().unwrap();

        for _ in 0..50 {
            let (tx, mut rx) = mpsc::unbounded_channel();
            for i in 0..20 {
                let tx = tx.clone();
                let _ = scheduler.schedule(
                    Duration::from_millis(2),
                    Box::new(move || {
                        let _ = tx.send(i);
                    }),
                );
            }
            drop(tx);

            let mut order = Vec::new();
            while let Some(i) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
            {
                order.push(i);
            }
            assert_eq!(order, (0..20).collect::<Vec<_>>());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_clones_share_one_timeline() {
        let scheduler = TokioScheduler::current().unwrap();
        let clone = scheduler.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let late = tx.clone();
        let _ = scheduler.schedule(
            Duration::from_secs(2),
            Box::new(move || {
                let _ = late.send("late");
            }),
        );
        let cancelled = clone.schedule(
            Duration::from_secs(1),
            Box::new(|| panic!("cancelled job fired")),
        );
        let _ = clone.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                let _ = tx.send("early");
            }),
        );
        cancelled.cancel();
        assert_eq!(scheduler.pending(), 2);

        assert_eq!(rx.recv().await, Some("early"));
        assert_eq!(rx.recv().await, Some("late"));
        assert_eq!(rx.recv().await, None);
    }
}
