//! Countdown example binary
//!
//! Runs a short countdown on the real clock, restarts it halfway through, and
//! prints the actions effects feed back into the store.

use anyhow::Context;
use countdown::{CountdownAction, CountdownEnvironment, CountdownReducer, CountdownState};
use statecraft_core::SchedulerRef;
use statecraft_runtime::metrics::MetricsExporter;
use statecraft_runtime::{Store, StoreConfig, TokioScheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "countdown=debug,statecraft_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut exporter = MetricsExporter::new();
    exporter.install().context("installing metrics exporter")?;

    let clock: SchedulerRef = Arc::new(TokioScheduler::current()?);
    let env = CountdownEnvironment::new(clock).with_interval(Duration::from_millis(250));
    let store = Store::with_config(
        CountdownState::default(),
        CountdownReducer,
        env,
        StoreConfig::default().with_name("countdown"),
    );
    let mut actions = store.subscribe_actions();

    println!("=== Countdown Example ===\n");

    println!(">>> Sending: Start(4)");
    store.send(CountdownAction::Start(4));

    let mut restarted = false;
    loop {
        let action = tokio::time::timeout(Duration::from_secs(5), actions.recv())
            .await
            .context("countdown stalled")?
            .context("store closed")?;
        let state = store.snapshot();
        println!("<<< {action:?} (remaining: {})", state.remaining);

        match action {
            CountdownAction::Tick if state.remaining == 2 && !restarted => {
                restarted = true;
                println!(">>> Sending: Start(3)");
                store.send(CountdownAction::Start(3));
            },
            CountdownAction::Finished => break,
            _ => {},
        }
    }

    let state = store.snapshot();
    println!("\nCompleted countdowns: {}", state.completed);
    println!("In-flight effects: {}", store.in_flight_effects());

    if let Some(metrics) = exporter.render() {
        println!("\n=== Metrics ===\n{metrics}");
    }

    Ok(())
}
