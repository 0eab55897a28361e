//! # Countdown Example
//!
//! A countdown timer built from delayed, cancellable effects.
//!
//! This example showcases:
//! - Effects deferred on an injected scheduler
//! - Cancellation through a [`CancelId`]
//! - Follow-on actions produced by effects
//!
//! Each `Tick` schedules the next one a second later under the same cancel
//! id, so `Stop` (or a new `Start`) ends the whole chain.
//!
//! ## Example
//!
//! ```no_run
//! use countdown::{CountdownAction, CountdownEnvironment, CountdownReducer, CountdownState};
//! use statecraft_runtime::{Store, TokioScheduler};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let env = CountdownEnvironment::new(Arc::new(TokioScheduler::current()?));
//! let store = Store::new(CountdownState::default(), CountdownReducer, env);
//!
//! store.send(CountdownAction::Start(3));
//! # Ok(())
//! # }
//! ```

use statecraft_core::{CancelId, Effect, Reducer, SchedulerRef};
use std::time::Duration;

/// Cancel id shared by every pending tick
pub const TICKS: &str = "countdown.ticks";

/// Countdown state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownState {
    /// Seconds left
    pub remaining: u32,
    /// Whether a countdown is in progress
    pub running: bool,
    /// Countdowns that reached zero
    pub completed: u32,
}

/// Countdown actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownAction {
    /// Start counting down from the given number of seconds
    Start(u32),
    /// One second passed
    Tick,
    /// Abandon the running countdown
    Stop,
    /// The countdown reached zero
    Finished,
}

/// Countdown environment
#[derive(Clone)]
pub struct CountdownEnvironment {
    /// Clock the ticks are scheduled on
    pub clock: SchedulerRef,
    /// Time between ticks
    pub interval: Duration,
}

impl CountdownEnvironment {
    /// Create an environment ticking once a second on `clock`
    #[must_use]
    pub const fn new(clock: SchedulerRef) -> Self {
        Self {
            clock,
            interval: Duration::from_secs(1),
        }
    }

    /// Set the time between ticks
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn next_tick(&self) -> Effect<CountdownAction> {
        Effect::value(CountdownAction::Tick)
            .delay(self.interval, self.clock.clone())
            .cancellable(CancelId::new(TICKS))
    }
}

/// Countdown reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct CountdownReducer;

impl Reducer for CountdownReducer {
    type State = CountdownState;
    type Action = CountdownAction;
    type Environment = CountdownEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        match action {
            CountdownAction::Start(0) => Effect::value(CountdownAction::Finished),
            CountdownAction::Start(seconds) => {
                state.remaining = seconds;
                state.running = true;
                // Restarting replaces any chain already in progress
                Effect::concatenate([Effect::cancel(TICKS), env.next_tick()])
            },
            CountdownAction::Tick if !state.running => Effect::none(),
            CountdownAction::Tick => {
                state.remaining = state.remaining.saturating_sub(1);
                if state.remaining == 0 {
                    Effect::value(CountdownAction::Finished)
                } else {
                    env.next_tick()
                }
            },
            CountdownAction::Stop => {
                state.running = false;
                Effect::cancel(TICKS)
            },
            CountdownAction::Finished => {
                state.running = false;
                state.completed += 1;
                Effect::none()
            },
        }
    }
}
