//! Integration tests for effect execution through the Store
//!
//! Virtual time comes from `statecraft_testing::TestScheduler`; real time from
//! Tokio with the clock paused.

#![allow(clippy::unwrap_used, clippy::panic)]

use proptest::prelude::*;
use statecraft_core::composition::BoxedReducer;
use statecraft_core::{
    CancelId, Effect, Reducer, SchedulerRef, combine_reducers, reducer_fn, scope_reducer,
};
use statecraft_runtime::{ActionOrigin, Store, StoreConfig, TokioScheduler};
use statecraft_testing::TestScheduler;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SECOND: Duration = Duration::from_secs(1);

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Action {
    /// Emit each `(label, delay)` pair after its delay, all at once
    Schedule(Vec<(u32, u64)>),
    /// Like `Schedule`, but cancellable under `"batch"`
    ScheduleCancellable(Vec<(u32, u64)>),
    /// Replace any running debounce with a new one
    Debounce(u32),
    Cancel,
    /// Emit `Fired(1)` after the delay, then `Fired(2)` right away
    DelayThenImmediate(Duration),
    /// Start a cancellable batch and cancel it within the same reduction
    StartAndCancel,
    Fired(u32),
}

fn delays(batch: Vec<(u32, u64)>, clock: &SchedulerRef) -> Effect<Action> {
    Effect::merge(batch.into_iter().map(|(label, secs)| {
        Effect::value(Action::Fired(label)).delay(Duration::from_secs(secs), Arc::clone(clock))
    }))
}

fn recorder() -> impl Reducer<State = Vec<u32>, Action = Action, Environment = SchedulerRef> + Send + Sync + 'static
{
    reducer_fn(|fired: &mut Vec<u32>, action: Action, clock: &SchedulerRef| match action {
        Action::Schedule(batch) => delays(batch, clock),
        Action::ScheduleCancellable(batch) => delays(batch, clock).cancellable("batch"),
        Action::Debounce(label) => Effect::value(Action::Fired(label))
            .delay(SECOND, Arc::clone(clock))
            .cancellable_in_flight("debounce"),
        Action::Cancel => Effect::cancel("batch"),
        Action::DelayThenImmediate(delay) => Effect::concatenate([
            Effect::value(Action::Fired(1)).delay(delay, Arc::clone(clock)),
            Effect::value(Action::Fired(2)),
        ]),
        Action::StartAndCancel => Effect::merge([
            Effect::concatenate([
                Effect::value(Action::Fired(1)),
                Effect::value(Action::Fired(2)).delay(SECOND, Arc::clone(clock)),
            ])
            .cancellable("batch"),
            Effect::cancel("batch"),
        ]),
        Action::Fired(label) => {
            fired.push(label);
            Effect::none()
        },
    })
}

fn virtual_store() -> (
    Arc<TestScheduler>,
    Store<Vec<u32>, Action, SchedulerRef, impl Reducer<State = Vec<u32>, Action = Action, Environment = SchedulerRef> + Send + Sync + 'static>,
) {
    let scheduler = TestScheduler::shared();
    let clock: SchedulerRef = scheduler.clone();
    let store = Store::new(Vec::new(), recorder(), clock);
    (scheduler, store)
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_merged_delays_fire_by_time_then_registration() {
    let (scheduler, store) = virtual_store();

    store.send(Action::Schedule(vec![(1, 2), (2, 1), (3, 2)]));
    scheduler.advance(SECOND);
    assert_eq!(store.snapshot(), vec![2]);

    scheduler.advance(SECOND);
    assert_eq!(store.snapshot(), vec![2, 1, 3]);
    assert_eq!(store.in_flight_effects(), 0);
}

#[test]
fn test_separate_sends_share_one_timeline() {
    let (scheduler, store) = virtual_store();

    store.send(Action::Schedule(vec![(1, 3)]));
    scheduler.advance(SECOND);
    store.send(Action::Schedule(vec![(2, 2)]));
    scheduler.advance(SECOND);
    store.send(Action::Schedule(vec![(3, 1)]));

    // All three come due at t=3, in registration order
    assert!(store.snapshot().is_empty());
    scheduler.advance(SECOND);
    assert_eq!(store.snapshot(), vec![1, 2, 3]);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancel_before_emission_discards_everything() {
    let (scheduler, store) = virtual_store();

    store.send(Action::ScheduleCancellable(vec![(1, 1), (2, 2)]));
    assert_eq!(store.live_cancellables(), 1);

    store.send(Action::Cancel);
    assert_eq!(store.live_cancellables(), 0);
    assert_eq!(scheduler.pending(), 0);

    scheduler.advance(2 * SECOND);
    assert!(store.snapshot().is_empty());
    assert_eq!(store.in_flight_effects(), 0);
}

#[test]
fn test_cancel_between_emissions_keeps_what_was_delivered() {
    let (scheduler, store) = virtual_store();

    store.send(Action::ScheduleCancellable(vec![(1, 1), (2, 2)]));
    scheduler.advance(SECOND);
    assert_eq!(store.cancel("batch"), 1);

    scheduler.advance(SECOND);
    assert_eq!(store.snapshot(), vec![1]);
}

#[test]
fn test_cancel_in_flight_restarts_the_timer() {
    let (scheduler, store) = virtual_store();

    store.send(Action::Debounce(1));
    scheduler.advance(Duration::from_millis(500));
    store.send(Action::Debounce(2));
    scheduler.advance(Duration::from_millis(500));
    assert!(store.snapshot().is_empty());

    scheduler.advance(Duration::from_millis(500));
    assert_eq!(store.snapshot(), vec![2]);
    assert_eq!(store.live_cancellables(), 0);
}

#[test]
fn test_queued_action_from_cancelled_effect_is_discarded() {
    let scheduler = TestScheduler::shared();
    let clock: SchedulerRef = scheduler.clone();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let store = Store::with_observer(
        Vec::new(),
        recorder(),
        clock,
        StoreConfig::default(),
        move |_, action: &Action, _: &Vec<u32>| sink.lock().unwrap().push(action.clone()),
    );

    // Fired(1) is queued while StartAndCancel is still being drained, and the
    // cancel lands before it is dequeued
    store.send(Action::StartAndCancel);

    assert_eq!(*log.lock().unwrap(), vec![Action::StartAndCancel]);
    assert!(store.snapshot().is_empty());
    assert_eq!(store.live_cancellables(), 0);
    assert_eq!(store.in_flight_effects(), 0);
    assert_eq!(scheduler.pending(), 0);

    scheduler.advance(2 * SECOND);
    assert!(store.snapshot().is_empty());
}

#[test]
fn test_cancelling_an_unknown_id_is_a_no_op() {
    let (_scheduler, store) = virtual_store();
    assert_eq!(store.cancel(CancelId::unique()), 0);
    store.send(Action::Cancel);
    assert!(store.snapshot().is_empty());
}

// ============================================================================
// Observation
// ============================================================================

#[test]
fn test_observer_sees_effect_actions_after_the_sent_one() {
    let scheduler = TestScheduler::shared();
    let clock: SchedulerRef = scheduler.clone();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);

    let store = Store::with_observer(
        Vec::new(),
        recorder(),
        clock,
        StoreConfig::default().with_name("observed"),
        move |origin, action: &Action, state: &Vec<u32>| {
            sink.lock().unwrap().push((origin, action.clone(), state.len()));
        },
    );

    store.send(Action::Schedule(vec![(7, 0)]));
    scheduler.advance(Duration::ZERO);

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (ActionOrigin::Sent, Action::Schedule(vec![(7, 0)]), 0),
            (ActionOrigin::Effect, Action::Fired(7), 1),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_real_clock_delays_are_broadcast() {
    let clock: SchedulerRef = Arc::new(TokioScheduler::current().unwrap());
    let store = Store::new(Vec::new(), recorder(), clock);
    let mut actions = store.subscribe_actions();

    store.send(Action::Schedule(vec![(1, 2), (2, 1)]));

    assert_eq!(actions.recv().await.unwrap(), Action::Fired(2));
    assert_eq!(actions.recv().await.unwrap(), Action::Fired(1));
    assert_eq!(store.snapshot(), vec![2, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_real_clock_concatenate_waits_for_the_delayed_action() {
    let clock: SchedulerRef = Arc::new(TokioScheduler::current().unwrap());

    for _ in 0..100 {
        let store = Store::new(Vec::new(), recorder(), Arc::clone(&clock));
        let mut actions = store.subscribe_actions();

        store.send(Action::DelayThenImmediate(Duration::from_millis(1)));

        let first = tokio::time::timeout(Duration::from_secs(5), actions.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), actions.recv()).await.unwrap();
        assert_eq!(first.unwrap(), Action::Fired(1));
        assert_eq!(second.unwrap(), Action::Fired(2));
        assert_eq!(store.snapshot(), vec![1, 2]);
    }
}

// ============================================================================
// Composition
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
struct App {
    timer: Vec<u32>,
    sends: u32,
}

#[derive(Clone, Debug, PartialEq)]
enum AppAction {
    Timer(Action),
}

#[test]
fn test_child_effects_are_lifted_into_the_parent() {
    let scheduler = TestScheduler::shared();
    let clock: SchedulerRef = scheduler.clone();

    let timer = scope_reducer(
        reducer_fn(|fired: &mut Vec<u32>, action: AppAction, clock: &SchedulerRef| {
            let AppAction::Timer(action) = action;
            recorder().reduce(fired, action, clock).map(AppAction::Timer)
        }),
        |app: &App| &app.timer,
        |app: &mut App, timer| app.timer = timer,
    );
    let counter = reducer_fn(|app: &mut App, action: AppAction, _: &SchedulerRef| {
        if matches!(action, AppAction::Timer(Action::Schedule(_))) {
            app.sends += 1;
        }
        Effect::none()
    });
    let reducers: Vec<BoxedReducer<App, AppAction, SchedulerRef>> =
        vec![Box::new(timer), Box::new(counter)];
    let store = Store::new(App::default(), combine_reducers(reducers), clock);

    store.send(AppAction::Timer(Action::Schedule(vec![(4, 1)])));
    scheduler.advance(SECOND);

    assert_eq!(
        store.snapshot(),
        App {
            timer: vec![4],
            sends: 1,
        }
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_delays_fire_in_time_then_registration_order(
        secs in proptest::collection::vec(0_u64..5, 1..12),
    ) {
        let (scheduler, store) = virtual_store();
        let batch: Vec<(u32, u64)> = secs.iter().copied().enumerate()
            .map(|(i, s)| (u32::try_from(i).unwrap(), s))
            .collect();

        store.send(Action::Schedule(batch.clone()));
        scheduler.advance(Duration::from_secs(5));

        let mut expected = batch;
        expected.sort_by_key(|&(label, secs)| (secs, label));
        let expected: Vec<u32> = expected.into_iter().map(|(label, _)| label).collect();
        prop_assert_eq!(store.snapshot(), expected);
        prop_assert_eq!(store.in_flight_effects(), 0);
    }
}
