//! Integration tests for `Effect::Stream` execution in the Store
//!
//! Stream items are fed back to the reducer as they arrive; the subscription
//! stays in flight until the stream ends or is cancelled.

#![allow(clippy::unwrap_used, clippy::panic)]

use async_stream::stream;
use statecraft_core::{Effect, Reducer, reducer_fn};
use statecraft_runtime::Store;
use statecraft_testing::init_tracing;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Clone, Debug, Default, PartialEq)]
struct StreamState {
    items_received: Vec<String>,
    completed: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum StreamAction {
    StartStream { items: Vec<String> },
    StartTicker,
    StopTicker,
    StreamItem { text: String },
    StreamComplete,
}

fn stream_reducer()
-> impl Reducer<State = StreamState, Action = StreamAction, Environment = ()> + Send + Sync + 'static {
    reducer_fn(|state: &mut StreamState, action: StreamAction, (): &()| match action {
        StreamAction::StartStream { items } => Effect::stream(futures::stream::iter(
            items
                .into_iter()
                .map(|text| StreamAction::StreamItem { text })
                .chain(std::iter::once(StreamAction::StreamComplete)),
        )),
        StreamAction::StartTicker => Effect::stream(stream! {
            for tick in 0.. {
                tokio::time::sleep(Duration::from_secs(1)).await;
                yield StreamAction::StreamItem { text: format!("tick-{tick}") };
            }
        })
        .cancellable("ticker"),
        StreamAction::StopTicker => Effect::cancel("ticker"),
        StreamAction::StreamItem { text } => {
            state.items_received.push(text);
            Effect::none()
        },
        StreamAction::StreamComplete => {
            state.completed = true;
            Effect::none()
        },
    })
}

async fn next(actions: &mut broadcast::Receiver<StreamAction>) -> StreamAction {
    tokio::time::timeout(Duration::from_secs(30), actions.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_stream_basic_execution() {
    init_tracing();
    let store = Store::new(StreamState::default(), stream_reducer(), ());
    let mut actions = store.subscribe_actions();

    store.send(StreamAction::StartStream {
        items: vec!["a".into(), "b".into(), "c".into()],
    });

    while next(&mut actions).await != StreamAction::StreamComplete {}

    let state = store.snapshot();
    assert_eq!(state.items_received, vec!["a", "b", "c"]);
    assert!(state.completed);
}

#[tokio::test]
async fn test_empty_stream_completes() {
    let store = Store::new(StreamState::default(), stream_reducer(), ());
    let mut actions = store.subscribe_actions();

    store.send(StreamAction::StartStream { items: Vec::new() });

    assert_eq!(next(&mut actions).await, StreamAction::StreamComplete);
    assert!(store.snapshot().items_received.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_stream_stops_emitting() {
    init_tracing();
    let store = Store::new(StreamState::default(), stream_reducer(), ());
    let mut actions = store.subscribe_actions();

    store.send(StreamAction::StartTicker);
    assert_eq!(store.live_cancellables(), 1);

    for expected in ["tick-0", "tick-1"] {
        assert_eq!(
            next(&mut actions).await,
            StreamAction::StreamItem {
                text: expected.into()
            }
        );
    }

    store.send(StreamAction::StopTicker);
    assert_eq!(store.live_cancellables(), 0);
    assert_eq!(store.in_flight_effects(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.snapshot().items_received, vec!["tick-0", "tick-1"]);
    assert_eq!(store.pending_tasks(), 0);
}
