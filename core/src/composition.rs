//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action, merging their effects
//! - **`scope_reducer`**: Focus a reducer on a subset of state
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use statecraft_core::{Effect, Reducer};
//! use statecraft_core::composition::combine_reducers;
//!
//! #[derive(Clone)]
//! struct MyState {
//!     count: i32,
//!     name: String,
//! }
//!
//! #[derive(Clone)]
//! enum MyAction {
//!     Increment,
//!     SetName(String),
//! }
//!
//! struct CounterReducer;
//! struct NameReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut MyState, action: MyAction, _env: &()) -> Effect<MyAction> {
//!         if let MyAction::Increment = action {
//!             state.count += 1;
//!         }
//!         Effect::none()
//!     }
//! }
//!
//! impl Reducer for NameReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut MyState, action: MyAction, _env: &()) -> Effect<MyAction> {
//!         if let MyAction::SetName(name) = action {
//!             state.name = name;
//!         }
//!         Effect::none()
//!     }
//! }
//!
//! let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);
//! let mut state = MyState { count: 0, name: String::new() };
//! let _ = combined.reduce(&mut state, MyAction::Increment, &());
//! assert_eq!(state.count, 1);
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;

/// Boxed reducer as accepted by [`combine_reducers`]
pub type BoxedReducer<S, A, E> = Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence against the same state. Their effects are
/// merged, so they run concurrently once subscribed.
#[must_use]
pub fn combine_reducers<S, A, E>(reducers: Vec<BoxedReducer<S, A, E>>) -> CombinedReducer<S, A, E>
where
    A: Clone,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E> {
    reducers: Vec<BoxedReducer<S, A, E>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    A: Clone,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        self.reducers
            .iter()
            .map(|reducer| reducer.reduce(state, action.clone(), env))
            .fold(Effect::none(), Effect::merge_with)
    }
}

/// Scopes a reducer to operate on a subset of a larger state.
///
/// # Examples
///
/// ```
/// use statecraft_core::{Effect, Reducer};
/// use statecraft_core::composition::scope_reducer;
///
/// #[derive(Clone, Default)]
/// struct CounterState {
///     count: i32,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = CounterState;
///     type Action = i32;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut CounterState, by: i32, _env: &()) -> Effect<i32> {
///         state.count += by;
///         Effect::none()
///     }
/// }
///
/// #[derive(Clone, Default)]
/// struct AppState {
///     counter: CounterState,
///     other_data: String,
/// }
///
/// let scoped = scope_reducer(
///     CounterReducer,
///     |app: &AppState| &app.counter,
///     |app: &mut AppState, counter: CounterState| app.counter = counter,
/// );
///
/// let mut state = AppState::default();
/// let _ = scoped.reduce(&mut state, 3, &());
/// assert_eq!(state.counter.count, 3);
/// ```
pub fn scope_reducer<S, SubS, R>(
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
) -> ScopedReducer<S, SubS, R>
where
    SubS: Clone,
    R: Reducer<State = SubS>,
{
    ScopedReducer {
        reducer,
        get_state,
        set_state,
    }
}

/// A scoped reducer that operates on a subset of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, R> {
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
}

impl<S, SubS, R> Reducer for ScopedReducer<S, SubS, R>
where
    SubS: Clone,
    R: Reducer<State = SubS>,
{
    type State = S;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        let mut sub_state = (self.get_state)(state).clone();
        let effect = self.reducer.reduce(&mut sub_state, action, env);
        (self.set_state)(state, sub_state);
        effect
    }
}
