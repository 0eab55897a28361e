//! Reducer module - The core trait for business logic
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effect)`
//!
//! They contain all business logic and are deterministic and testable. The
//! runtime treats a reducer as an opaque capability: it calls
//! [`Reducer::reduce`] once per action and subscribes to whatever effect comes
//! back. Failures never cross this boundary; model them as actions.

use crate::effect::Effect;
use std::fmt;
use std::marker::PhantomData;

/// The Reducer trait - core abstraction for business logic
///
/// # Type Parameters
///
/// - `State`: The domain state this reducer operates on
/// - `Action`: The action type this reducer processes
/// - `Environment`: The injected dependencies this reducer needs
///
/// # Example
///
/// ```
/// use statecraft_core::{Effect, Reducer};
///
/// #[derive(Clone, Debug)]
/// enum CounterAction {
///     Increment,
///     Decrement,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = i64;
///     type Action = CounterAction;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut i64, action: CounterAction, _env: &()) -> Effect<CounterAction> {
///         match action {
///             CounterAction::Increment => *state += 1,
///             CounterAction::Decrement => *state -= 1,
///         }
///         Effect::none()
///     }
/// }
///
/// let mut count = 0;
/// let _ = CounterReducer.reduce(&mut count, CounterAction::Increment, &());
/// assert_eq!(count, 1);
/// ```
pub trait Reducer {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// The environment type with injected dependencies
    type Environment;

    /// Reduce an action into state changes and an effect
    ///
    /// This is a pure function that:
    /// 1. Updates state in place
    /// 2. Returns an effect description to be executed
    ///
    /// # Arguments
    ///
    /// - `state`: Mutable reference to current state
    /// - `action`: The action to process
    /// - `env`: Reference to injected dependencies
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action>;
}

/// A reducer backed by a closure.
///
/// Created by [`reducer_fn`].
pub struct FnReducer<S, A, E, F> {
    f: F,
    _phantom: PhantomData<fn(&mut S, A, &E)>,
}

/// Build a reducer from a closure
///
/// # Example
///
/// ```
/// use statecraft_core::{reducer_fn, Effect, Reducer};
///
/// let doubler = reducer_fn(|state: &mut u32, by: u32, _env: &()| {
///     *state *= by;
///     Effect::none()
/// });
///
/// let mut state = 3;
/// let _ = doubler.reduce(&mut state, 2, &());
/// assert_eq!(state, 6);
/// ```
pub const fn reducer_fn<S, A, E, F>(f: F) -> FnReducer<S, A, E, F>
where
    F: Fn(&mut S, A, &E) -> Effect<A>,
{
    FnReducer {
        f,
        _phantom: PhantomData,
    }
}

impl<S, A, E, F> Reducer for FnReducer<S, A, E, F>
where
    F: Fn(&mut S, A, &E) -> Effect<A>,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(&self, state: &mut S, action: A, env: &E) -> Effect<A> {
        (self.f)(state, action, env)
    }
}

impl<S, A, E, F: Clone> Clone for FnReducer<S, A, E, F> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, A, E, F> fmt::Debug for FnReducer<S, A, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReducer").finish_non_exhaustive()
    }
}
