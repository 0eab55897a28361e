//! # Statecraft Testing
//!
//! Testing utilities for the statecraft architecture.
//!
//! This crate provides:
//! - [`TestScheduler`]: a virtual clock advanced explicitly by the test
//! - [`TestStore`]: step-by-step `send`/`receive` assertions against a running store,
//!   in exhaustive and non-exhaustive flavours
//! - [`ReducerTest`]: Given-When-Then assertions against a bare reducer
//! - [`debug_diff`]: readable expected-vs-actual diffs
//!
//! ## Example
//!
//! ```
//! use statecraft_core::{reducer_fn, Effect, SchedulerRef};
//! use statecraft_testing::{TestScheduler, TestStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum Action {
//!     Start,
//!     Tick,
//! }
//!
//! let scheduler = TestScheduler::shared();
//! let reducer = reducer_fn(|ticks: &mut u32, action: Action, clock: &SchedulerRef| match action {
//!     Action::Start => Effect::value(Action::Tick).delay(Duration::from_secs(1), Arc::clone(clock)),
//!     Action::Tick => {
//!         *ticks += 1;
//!         Effect::none()
//!     },
//! });
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let clock: SchedulerRef = scheduler.clone();
//! let mut store = TestStore::new(0, reducer, clock);
//!
//! store.send(Action::Start, |_| {}).unwrap();
//! scheduler.advance(Duration::from_secs(1));
//! store.receive(Action::Tick, |ticks| *ticks = 1).await.unwrap();
//! store.finish().await.unwrap();
//! # });
//! ```

mod diff;
mod error;
mod scheduler;
mod store;

pub use diff::debug_diff;
pub use error::{Mismatch, Outcome, TestStoreError};
pub use reducer_test::{ReducerTest, assertions};
pub use scheduler::TestScheduler;
pub use store::{Exhaustivity, TestStore, TestStoreConfig};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber that writes through the test harness
///
/// Honours `RUST_LOG`, defaulting to `warn`. Safe to call from every test;
/// only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
