//! Virtual clock scheduler
//!
//! [`TestScheduler`] only moves when a test tells it to. Advancing fires every
//! job due by the new time, earliest first; jobs due at the same instant fire
//! in registration order. A repeating job keeps its original registration
//! rank every time it re-registers, so it still wins ties against jobs
//! registered after it.

use statecraft_core::{Job, RepeatingJob, Scheduler, TimerHandle};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Smallest interval a repeating job may use; zero would never let time advance
const MIN_INTERVAL: Duration = Duration::from_nanos(1);

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
struct Timeline {
    now: Duration,
    next_sequence: u64,
    scheduled: BTreeMap<(Duration, u64), Scheduled>,
}

/// A deterministic scheduler driven by explicit calls to `advance`.
///
/// # Example
///
/// ```
/// use statecraft_core::Scheduler;
/// use statecraft_testing::TestScheduler;
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// let scheduler = TestScheduler::new();
/// let fired = Arc::new(Mutex::new(Vec::new()));
///
/// let log = Arc::clone(&fired);
/// let _ = scheduler.schedule(Duration::from_secs(2), Box::new(move || log.lock().unwrap().push("late")));
/// let log = Arc::clone(&fired);
/// let _ = scheduler.schedule(Duration::from_secs(1), Box::new(move || log.lock().unwrap().push("early")));
///
/// scheduler.advance(Duration::from_secs(1));
/// assert_eq!(*fired.lock().unwrap(), vec!["early"]);
///
/// scheduler.advance(Duration::from_secs(1));
/// assert_eq!(*fired.lock().unwrap(), vec!["early", "late"]);
/// ```
#[derive(Default)]
pub struct TestScheduler {
    timeline: Mutex<Timeline>,
}

impl TestScheduler {
    /// Create a scheduler whose clock reads zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scheduler ready to be put into an environment
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current virtual time
    #[must_use]
    pub fn now(&self) -> Duration {
        self.timeline().now
    }

    /// Number of jobs waiting to fire
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timeline()
            .scheduled
            .values()
            .filter(|scheduled| !scheduled.timer.is_cancelled())
            .count()
    }

    /// Move the clock forward by `by`, firing every job that comes due
    ///
    /// The clock stops at `Duration::MAX`, so `advance(Duration::MAX)` runs
    /// every job that will ever fire. With a repeating job scheduled that
    /// only returns once the job's next firing would overflow the clock.
    pub fn advance(&self, by: Duration) {
        let target = self.now().saturating_add(by);
        self.run_until(target);
    }

    /// Move the clock to `instant`, firing every job that comes due
    ///
    /// An instant in the past only fires jobs already due.
    pub fn advance_to(&self, instant: Duration) {
        let target = instant.max(self.now());
        self.run_until(target);
    }

    /// Move the clock to the earliest scheduled job and fire everything due then
    ///
    /// With nothing scheduled the clock stays put. Jobs already due at the
    /// current time fire without moving the clock.
    pub fn advance_to_next(&self) {
        let target = {
            let timeline = self.timeline();
            timeline
                .scheduled
                .iter()
                .find(|(_, scheduled)| !scheduled.timer.is_cancelled())
                .map_or(timeline.now, |((at, _), _)| (*at).max(timeline.now))
        };
        self.run_until(target);
    }

    fn run_until(&self, target: Duration) {
        loop {
            // The lock is released before a job runs; jobs schedule more jobs
            let due = {
                let mut timeline = self.timeline();
                let Some(entry) = timeline.scheduled.first_entry() else {
                    break;
                };
                if entry.key().0 > target {
                    break;
                }
                let ((at, sequence), scheduled) = entry.remove_entry();
                timeline.now = timeline.now.max(at);
                (at, sequence, scheduled)
            };

            let (at, sequence, Scheduled { timer, kind }) = due;
            if timer.is_cancelled() {
                continue;
            }

            match kind {
                Kind::Once(job) => job(),
                Kind::Repeating { interval, mut job } => {
                    job();
                    // A next firing past the end of the clock never happens
                    let next = at.checked_add(interval);
                    if let Some(next) = next.filter(|_| !timer.is_cancelled()) {
                        self.timeline().scheduled.insert(
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

        let mut timeline = self.timeline();
        timeline.now = timeline.now.max(target);
    }

    fn insert(&self, after: Duration, kind: Kind) -> TimerHandle {
        let timer = TimerHandle::new();
        let mut timeline = self.timeline();
        let at = timeline.now.saturating_add(after);
        let sequence = timeline.next_sequence;
        timeline.next_sequence += 1;
        timeline.scheduled.insert(
            (at, sequence),
            Scheduled {
                timer: timer.clone(),
                kind,
            },
        );
        timer
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> Duration {
        Self::now(self)
    }

    fn schedule(&self, after: Duration, job: Job) -> TimerHandle {
        self.insert(after, Kind::Once(job))
    }

    fn schedule_repeating(
        &self,
        after: Duration,
        interval: Duration,
        job: RepeatingJob,
    ) -> TimerHandle {
        self.insert(
            after,
            Kind::Repeating {
                interval: interval.max(MIN_INTERVAL),
                job,
            },
        )
    }
}

impl std::fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timeline = self.timeline();
        f.debug_struct("TestScheduler")
            .field("now", &timeline.now)
            .field("scheduled", &timeline.scheduled.len())
            .finish()
    }
}
