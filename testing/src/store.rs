//! Step-by-step assertions against a running store
//!
//! A [`TestStore`] wraps a [`Store`] and keeps two views of state: the actual
//! state, and the state the test has asserted so far. Every assertion applies
//! the test's update to the asserted state and compares the result with what
//! the reducer actually produced.
//!
//! Actions produced by effects are reduced as usual and also recorded, together
//! with the state right after they were applied, in the received-action queue.
//! `receive` consumes that queue in order.

#![allow(clippy::module_name_repetitions)] // TestStore is the natural name

use crate::diff::debug_diff;
use crate::error::{Mismatch, Outcome, TestStoreError};
use serde::{Deserialize, Serialize};
use statecraft_core::Reducer;
use statecraft_runtime::{ActionOrigin, Store, StoreConfig};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How strictly a [`TestStore`] holds the test to account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustivity {
    /// Every state change and every received action must be asserted
    #[default]
    On,
    /// Only what the test touches is checked; the rest is tolerated
    Off,
}

/// Test store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestStoreConfig {
    /// Assertion strictness
    pub exhaustivity: Exhaustivity,
    /// How long async assertions wait for running tasks to produce actions
    pub timeout: Duration,
}

impl TestStoreConfig {
    /// Configuration for a non-exhaustive test store
    #[must_use]
    pub fn non_exhaustive() -> Self {
        Self::default().with_exhaustivity(Exhaustivity::Off)
    }

    /// Set the exhaustivity
    #[must_use]
    pub const fn with_exhaustivity(mut self, exhaustivity: Exhaustivity) -> Self {
        self.exhaustivity = exhaustivity;
        self
    }

    /// Set the receive timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for TestStoreConfig {
    fn default() -> Self {
        Self {
            exhaustivity: Exhaustivity::On,
            timeout: Duration::from_secs(1),
        }
    }
}

struct Received<S, A> {
    action: A,
    state: S,
}

struct Recorder<S, A> {
    received: VecDeque<Received<S, A>>,
    last_sent: Option<S>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn describe<T: Debug>(value: &T) -> String {
    format!("{value:?}")
}

/// A store for asserting, step by step, what a reducer and its effects do.
///
/// # Example
///
/// ```
/// use statecraft_core::{reducer_fn, Effect};
/// use statecraft_testing::TestStore;
///
/// #[derive(Clone, Debug, PartialEq)]
/// enum Action {
///     Increment,
///     IncrementLater,
/// }
///
/// let reducer = reducer_fn(|count: &mut i32, action: Action, _env: &()| match action {
///     Action::Increment => {
///         *count += 1;
///         Effect::none()
///     },
///     Action::IncrementLater => Effect::value(Action::Increment),
/// });
///
/// # tokio_test_block_on(async {
/// let mut store = TestStore::new(0, reducer, ());
/// store.send(Action::IncrementLater, |_| {}).unwrap();
/// store.receive(Action::Increment, |count| *count = 1).await.unwrap();
/// store.finish().await.unwrap();
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
pub struct TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Send + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    store: Store<S, A, E, R>,
    recorder: Arc<Mutex<Recorder<S, A>>>,
    asserted: S,
    config: TestStoreConfig,
    tolerated: Vec<Mismatch>,
    finished: bool,
}

impl<S, A, E, R> TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Send + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Create an exhaustive test store
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_config(initial_state, reducer, environment, TestStoreConfig::default())
    }

    /// Create a test store with custom configuration
    #[must_use]
    pub fn with_config(
        initial_state: S,
        reducer: R,
        environment: E,
        config: TestStoreConfig,
    ) -> Self {
        let recorder = Arc::new(Mutex::new(Recorder {
            received: VecDeque::new(),
            last_sent: None,
        }));

        let sink = Arc::clone(&recorder);
        let store = Store::with_observer(
            initial_state.clone(),
            reducer,
            environment,
            StoreConfig::default().with_name("test_store"),
            move |origin, action: &A, state: &S| {
                let mut recorder = lock(&sink);
                match origin {
                    ActionOrigin::Sent => recorder.last_sent = Some(state.clone()),
                    ActionOrigin::Effect => recorder.received.push_back(Received {
                        action: action.clone(),
                        state: state.clone(),
                    }),
                }
            },
        );

        Self {
            store,
            recorder,
            asserted: initial_state,
            config,
            tolerated: Vec::new(),
            finished: false,
        }
    }

    /// Send an action and assert the state it produces
    ///
    /// `update` is applied to the last asserted state; the result must equal
    /// the state right after the reducer ran. Actions effects produce are
    /// queued for [`receive`](Self::receive). With [`Exhaustivity::Off`] this
    /// behaves like [`non_exhaustive_send`](Self::non_exhaustive_send).
    ///
    /// # Errors
    ///
    /// - [`TestStoreError::UnhandledReceived`] if received actions have not
    ///   been asserted yet (the action is not sent)
    /// - [`TestStoreError::StateMismatch`] if the state differs
    pub fn send(&mut self, action: A, update: impl Fn(&mut S)) -> Result<Outcome, TestStoreError> {
        if self.config.exhaustivity == Exhaustivity::Off {
            return self.non_exhaustive_send(action, update);
        }

        let unhandled = self.received_actions();
        if !unhandled.is_empty() {
            return Err(TestStoreError::UnhandledReceived {
                actions: unhandled.iter().map(describe).collect(),
            });
        }

        let mut expected = self.asserted.clone();
        update(&mut expected);

        let actual = self.dispatch(action.clone());
        self.asserted = actual.clone();

        if expected != actual {
            return Err(TestStoreError::StateMismatch {
                action: describe(&action),
                diff: debug_diff(&expected, &actual),
            });
        }
        Ok(Outcome::Passed)
    }

    /// Assert that the next received action is `expected`, and the state it produced
    ///
    /// Waits up to the configured timeout while async effect tasks are still
    /// running. Virtual-clock effects never cause waiting: advance the
    /// scheduler first. With [`Exhaustivity::Off`] this behaves like
    /// [`non_exhaustive_receive`](Self::non_exhaustive_receive).
    ///
    /// # Errors
    ///
    /// - [`TestStoreError::NothingReceived`] if no action arrived
    /// - [`TestStoreError::UnexpectedAction`] if the next action differs (it is still consumed)
    /// - [`TestStoreError::StateMismatch`] if the state differs
    pub async fn receive(
        &mut self,
        expected: A,
        update: impl Fn(&mut S),
    ) -> Result<Outcome, TestStoreError> {
        if self.config.exhaustivity == Exhaustivity::Off {
            return self.non_exhaustive_receive(expected, update).await;
        }

        self.wait_until(|this| !lock(&this.recorder).received.is_empty())
            .await;

        let next = lock(&self.recorder).received.pop_front();
        let Some(Received { action, state }) = next else {
            return Err(TestStoreError::NothingReceived {
                expected: describe(&expected),
            });
        };

        let mut expected_state = self.asserted.clone();
        update(&mut expected_state);
        self.asserted = state.clone();

        if action != expected {
            return Err(TestStoreError::UnexpectedAction {
                expected: describe(&expected),
                received: describe(&action),
                diff: debug_diff(&expected, &action),
            });
        }
        if expected_state != state {
            return Err(TestStoreError::StateMismatch {
                action: describe(&action),
                diff: debug_diff(&expected_state, &state),
            });
        }
        Ok(Outcome::Passed)
    }

    /// Send an action, checking only the fields `update` touches
    ///
    /// Unasserted received actions are skipped first. The full exhaustive
    /// comparison still runs, but a difference is only tolerated.
    ///
    /// # Errors
    ///
    /// [`TestStoreError::StateMismatch`] if applying `update` to the actual
    /// state changes it, i.e. a field `update` sets has a different value.
    pub fn non_exhaustive_send(
        &mut self,
        action: A,
        update: impl Fn(&mut S),
    ) -> Result<Outcome, TestStoreError> {
        let mut mismatches = Vec::new();
        for skipped in self.take_received() {
            mismatches.push(Mismatch::SkippedAction {
                action: describe(&skipped.action),
            });
            self.asserted = skipped.state;
        }

        let mut expected = self.asserted.clone();
        update(&mut expected);

        let actual = self.dispatch(action.clone());
        self.asserted = actual.clone();

        if expected != actual {
            mismatches.push(Mismatch::State {
                action: describe(&action),
                diff: debug_diff(&expected, &actual),
            });
        }

        let outcome = self.tolerate(mismatches);
        Self::check_partial(&action, &actual, &update)?;
        Ok(outcome)
    }

    /// Receive `expected`, skipping any received actions queued before it
    ///
    /// Skipped actions and an incomplete state assertion are tolerated; the
    /// fields `update` touches must match.
    ///
    /// # Errors
    ///
    /// - [`TestStoreError::MissingAction`] if no queued action equals `expected`
    ///   (nothing is consumed)
    /// - [`TestStoreError::StateMismatch`] if a field `update` sets differs
    pub async fn non_exhaustive_receive(
        &mut self,
        expected: A,
        update: impl Fn(&mut S),
    ) -> Result<Outcome, TestStoreError> {
        self.wait_until(|this| {
            lock(&this.recorder)
                .received
                .iter()
                .any(|received| received.action == expected)
        })
        .await;

        let consumed: Vec<_> = {
            let mut recorder = lock(&self.recorder);
            let Some(position) = recorder
                .received
                .iter()
                .position(|received| received.action == expected)
            else {
                return Err(TestStoreError::MissingAction {
                    expected: describe(&expected),
                });
            };
            recorder.received.drain(..=position).collect()
        };

        let mut consumed = consumed.into_iter();
        let Some(matched) = consumed.next_back() else {
            return Err(TestStoreError::MissingAction {
                expected: describe(&expected),
            });
        };

        let mut mismatches = Vec::new();
        for skipped in consumed {
            mismatches.push(Mismatch::SkippedAction {
                action: describe(&skipped.action),
            });
            self.asserted = skipped.state;
        }

        let mut expected_state = self.asserted.clone();
        update(&mut expected_state);
        self.asserted = matched.state.clone();

        if expected_state != matched.state {
            mismatches.push(Mismatch::State {
                action: describe(&matched.action),
                diff: debug_diff(&expected_state, &matched.state),
            });
        }

        let outcome = self.tolerate(mismatches);
        Self::check_partial(&matched.action, &matched.state, &update)?;
        Ok(outcome)
    }

    /// Consume every queued received action without asserting it
    ///
    /// The asserted state moves to the state after the last drained action.
    ///
    /// # Errors
    ///
    /// [`TestStoreError::NoActionsToSkip`] if `strict` and the queue is empty.
    pub fn drain_received_actions(&mut self, strict: bool) -> Result<Vec<A>, TestStoreError> {
        let drained = self.take_received();
        if drained.is_empty() && strict {
            return Err(TestStoreError::NoActionsToSkip);
        }

        let mut actions = Vec::with_capacity(drained.len());
        for Received { action, state } in drained {
            actions.push(action);
            self.asserted = state;
        }
        tracing::debug!(count = actions.len(), "Drained received actions");
        Ok(actions)
    }

    /// Cancel every in-flight effect, returning how many there were
    pub fn cancel_in_flight_effects(&self) -> usize {
        self.store.cancel_in_flight_effects()
    }

    /// Tear the store down, checking for residue in exhaustive mode
    ///
    /// Waits up to the configured timeout for running async tasks to finish.
    /// Effects are cancelled and the queue is cleared in both modes.
    ///
    /// # Errors
    ///
    /// [`TestStoreError::Teardown`] in exhaustive mode if received actions were
    /// never asserted or effects are still in flight.
    pub async fn finish(mut self) -> Result<(), TestStoreError> {
        self.finished = true;

        let result = match self.config.exhaustivity {
            Exhaustivity::On => {
                self.wait_until(|this| this.store.in_flight_effects() == 0)
                    .await;

                let unconsumed: Vec<String> = self.received_actions().iter().map(describe).collect();
                let leaked = self.store.in_flight_effects();
                if unconsumed.is_empty() && leaked == 0 {
                    Ok(())
                } else {
                    Err(TestStoreError::Teardown { unconsumed, leaked })
                }
            },
            Exhaustivity::Off => Ok(()),
        };

        self.teardown();
        result
    }

    /// The actual current state
    #[must_use]
    pub fn state(&self) -> S {
        self.store.snapshot()
    }

    /// The state as asserted so far
    #[must_use]
    pub const fn asserted_state(&self) -> &S {
        &self.asserted
    }

    /// Received actions not consumed yet, oldest first
    #[must_use]
    pub fn received_actions(&self) -> Vec<A> {
        lock(&self.recorder)
            .received
            .iter()
            .map(|received| received.action.clone())
            .collect()
    }

    /// Every mismatch tolerated so far
    #[must_use]
    pub fn tolerated(&self) -> &[Mismatch] {
        &self.tolerated
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &Store<S, A, E, R> {
        &self.store
    }

    /// Send through the store, returning the state right after `action` was reduced
    fn dispatch(&self, action: A) -> S {
        self.store.send(action);
        let sent = lock(&self.recorder).last_sent.take();
        sent.unwrap_or_else(|| self.store.snapshot())
    }

    fn take_received(&self) -> Vec<Received<S, A>> {
        lock(&self.recorder).received.drain(..).collect()
    }

    fn check_partial(action: &A, actual: &S, update: &impl Fn(&mut S)) -> Result<(), TestStoreError> {
        let mut touched = actual.clone();
        update(&mut touched);
        if touched == *actual {
            Ok(())
        } else {
            Err(TestStoreError::StateMismatch {
                action: describe(action),
                diff: debug_diff(&touched, actual),
            })
        }
    }

    fn tolerate(&mut self, mismatches: Vec<Mismatch>) -> Outcome {
        for mismatch in &mismatches {
            tracing::warn!(%mismatch, "Tolerated mismatch");
        }
        self.tolerated.extend(mismatches.iter().cloned());
        Outcome::from_mismatches(mismatches)
    }

    /// Wait until `ready` holds, no async task is running, or the timeout passes
    async fn wait_until(&self, ready: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        let activity = self.store.activity();
        loop {
            let notified = activity.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if ready(self) || self.store.pending_tasks() == 0 {
                return;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::debug!(
                    pending_tasks = self.store.pending_tasks(),
                    "Timed out waiting for effects"
                );
                return;
            }
        }
    }

    fn teardown(&mut self) {
        self.store.cancel_in_flight_effects();
        let mut recorder = lock(&self.recorder);
        recorder.received.clear();
        recorder.last_sent = None;
    }
}

impl<S, A, E, R> Drop for TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Send + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished
            && self.config.exhaustivity == Exhaustivity::On
            && !std::thread::panicking()
        {
            let unconsumed = lock(&self.recorder).received.len();
            let leaked = self.store.in_flight_effects();
            if unconsumed > 0 || leaked > 0 {
                tracing::warn!(
                    unconsumed,
                    leaked,
                    "TestStore dropped without finish(); discarding received actions and cancelling effects"
                );
            }
        }
        self.teardown();
    }
}
