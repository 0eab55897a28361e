//! # Statecraft Core
//!
//! Core traits and types for the statecraft architecture.
//!
//! This crate provides the fundamental abstractions for building reducer-driven
//! applications whose side effects are plain values:
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effect)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies
//! - **Scheduler**: The clock effects are deferred on (real or virtual)
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```
//! use statecraft_core::{reducer_fn, Effect, Reducer};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum CounterAction {
//!     Increment,
//!     IncrementTwice,
//! }
//!
//! let reducer = reducer_fn(|count: &mut i64, action: CounterAction, _env: &()| match action {
//!     CounterAction::Increment => {
//!         *count += 1;
//!         Effect::none()
//!     },
//!     CounterAction::IncrementTwice => Effect::concatenate([
//!         Effect::value(CounterAction::Increment),
//!         Effect::value(CounterAction::Increment),
//!     ]),
//! });
//!
//! let mut count = 0;
//! let effect = reducer.reduce(&mut count, CounterAction::Increment, &());
//! assert_eq!(count, 1);
//! assert!(effect.is_none());
//! ```

/// Cancellation identities
pub mod cancel;

/// Reducer composition utilities
pub mod composition;

/// Side effect descriptions
pub mod effect;

/// The reducer trait and closure adapter
pub mod reducer;

/// Scheduler abstraction shared by real and virtual clocks
pub mod scheduler;

pub use cancel::CancelId;
pub use composition::{combine_reducers, scope_reducer};
pub use effect::{ActionStream, Effect, TaskFuture, Work};
pub use reducer::{FnReducer, Reducer, reducer_fn};
pub use scheduler::{Job, RepeatingJob, Scheduler, SchedulerError, SchedulerRef, TimerHandle};
