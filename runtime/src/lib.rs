//! # Statecraft Runtime
//!
//! Runtime implementation for the statecraft architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect subscription.
//!
//! ## Core Components
//!
//! - **Store**: Owns state and serializes dispatch through a trampoline
//! - **Subscription engine**: Interprets effect trees and feeds produced actions back
//! - **Cancellation registry**: Disposes subscriptions by [`CancelId`](statecraft_core::CancelId)
//! - **Schedulers**: [`TokioScheduler`] (real clock) and [`ImmediateScheduler`]
//!
//! ## Example
//!
//! ```
//! use statecraft_core::{reducer_fn, Effect};
//! use statecraft_runtime::Store;
//!
//! #[derive(Clone, Debug)]
//! enum Action {
//!     Add(u32),
//!     AddTwice(u32),
//! }
//!
//! let reducer = reducer_fn(|total: &mut u32, action: Action, _env: &()| match action {
//!     Action::Add(n) => {
//!         *total += n;
//!         Effect::none()
//!     },
//!     Action::AddTwice(n) => Effect::concatenate([
//!         Effect::value(Action::Add(n)),
//!         Effect::value(Action::Add(n)),
//!     ]),
//! });
//!
//! let store = Store::new(0, reducer, ());
//! store.send(Action::AddTwice(21));
//! assert_eq!(store.snapshot(), 42);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

mod engine;
mod lifetime;
mod registry;

/// Prometheus metrics for observability
pub mod metrics;

/// Production schedulers
pub mod schedulers;

/// Store runtime
pub mod store;

pub use schedulers::{ImmediateScheduler, TokioScheduler};
pub use store::{ActionOrigin, Observer, Store};

/// Store configuration
///
/// # Example
///
/// ```
/// use statecraft_runtime::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_name("checkout")
///     .with_broadcast_capacity(256);
/// assert_eq!(config.broadcast_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name recorded on the store's tracing spans
    pub name: String,
    /// Number of effect actions buffered for slow [`Store::subscribe_actions`] receivers
    pub broadcast_capacity: usize,
}

impl StoreConfig {
    /// Set the store name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            broadcast_capacity: 16,
        }
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
