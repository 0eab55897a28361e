//! Effect module - Side effect descriptions
//!
//! Effects are values. A reducer returns one to describe the work that should
//! follow a state transition; nothing happens until the Store subscribes to it.
//! Every subscription gets its own execution state, so the same description can
//! be subscribed to more than once.
//!
//! # Composition
//!
//! | Constructor | Emits | Completes |
//! |---|---|---|
//! | [`Effect::none`] | nothing | immediately |
//! | [`Effect::value`] | one action | right after emitting |
//! | [`Effect::merge`] | operands, interleaved | when every operand has completed |
//! | [`Effect::concatenate`] | operands, one after another | after the last operand |
//! | [`Effect::delay`] / [`Effect::receive_on`] | inner actions, on the scheduler | on the scheduler |
//! | [`Effect::cancellable`] | inner actions until cancelled | naturally, or when cancelled |
//! | [`Effect::cancel`] | nothing | immediately, after disposing the group |
//! | [`Effect::fire_and_forget`] | nothing | when the work finishes |
//! | [`Effect::task`] | the task's result | when the task finishes |
//! | [`Effect::stream`] | every stream item | when the stream ends |

use crate::cancel::CancelId;
use crate::scheduler::SchedulerRef;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Asynchronous work whose result, if any, is fed back as an action
pub type TaskFuture<A> = BoxFuture<'static, Option<A>>;

/// Long-living source of actions
pub type ActionStream<A> = BoxStream<'static, A>;

/// Work performed purely for its side effect.
pub enum Work {
    /// Runs synchronously when the effect is subscribed
    Sync(Box<dyn FnOnce() + Send + 'static>),
    /// Runs on the async runtime; the effect completes when it resolves
    Async(BoxFuture<'static, ()>),
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => write!(f, "Work::Sync(<closure>)"),
            Self::Async(_) => write!(f, "Work::Async(<future>)"),
        }
    }
}

/// Effect type - describes a side effect to be executed
///
/// Effects are NOT executed immediately. They are descriptions of what should happen,
/// returned from reducers and executed by the Store runtime.
///
/// # Type Parameters
///
/// - `A`: The action type that effects can produce (feedback loop)
pub enum Effect<A> {
    /// No-op effect
    None,

    /// Emit a single action
    Value(A),

    /// Run effects concurrently
    Merge(Vec<Effect<A>>),

    /// Run effects one after another
    Concatenate(Vec<Effect<A>>),

    /// Shift every emission and the completion of `effect` by `duration`
    Delay {
        /// Effect whose output is delayed
        effect: Box<Effect<A>>,
        /// How long to wait
        duration: Duration,
        /// Clock the delay is measured on
        scheduler: SchedulerRef,
    },

    /// Deliver every emission and the completion of `effect` on `scheduler`
    ReceiveOn {
        /// Effect whose output is re-scheduled
        effect: Box<Effect<A>>,
        /// Scheduler the output is delivered on
        scheduler: SchedulerRef,
    },

    /// Register the subscription of `effect` under `id`
    Cancellable {
        /// Effect that can be cancelled
        effect: Box<Effect<A>>,
        /// Group the subscription joins
        id: CancelId,
        /// Cancel the group before joining it
        cancel_in_flight: bool,
    },

    /// Dispose every live subscription registered under the id
    Cancel(CancelId),

    /// Perform work, emit nothing
    FireAndForget(Work),

    /// Arbitrary async computation
    ///
    /// Returns `Option<A>` - if Some, the action is fed back into the reducer
    Task(TaskFuture<A>),

    /// Emit every item of a stream until it ends
    Stream(ActionStream<A>),
}

// Manual Debug implementation since futures and streams don't implement Debug
impl<A> fmt::Debug for Effect<A>
where
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Value(action) => f.debug_tuple("Effect::Value").field(action).finish(),
            Effect::Merge(effects) => f.debug_tuple("Effect::Merge").field(effects).finish(),
            Effect::Concatenate(effects) => {
                f.debug_tuple("Effect::Concatenate").field(effects).finish()
            },
            Effect::Delay {
                effect, duration, ..
            } => f
                .debug_struct("Effect::Delay")
                .field("effect", effect)
                .field("duration", duration)
                .finish_non_exhaustive(),
            Effect::ReceiveOn { effect, .. } => f
                .debug_struct("Effect::ReceiveOn")
                .field("effect", effect)
                .finish_non_exhaustive(),
            Effect::Cancellable {
                effect,
                id,
                cancel_in_flight,
            } => f
                .debug_struct("Effect::Cancellable")
                .field("effect", effect)
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .finish(),
            Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            Effect::FireAndForget(work) => {
                f.debug_tuple("Effect::FireAndForget").field(work).finish()
            },
            Effect::Task(_) => write!(f, "Effect::Task(<future>)"),
            Effect::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
        }
    }
}

impl<A> Effect<A> {
    /// An effect that does nothing
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// An effect that emits `action` once
    #[must_use]
    pub const fn value(action: A) -> Self {
        Self::Value(action)
    }

    /// Combine effects to run concurrently
    #[must_use]
    pub fn merge(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        Self::Merge(effects.into_iter().collect())
    }

    /// Chain effects to run sequentially
    #[must_use]
    pub fn concatenate(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        Self::Concatenate(effects.into_iter().collect())
    }

    /// Cancel every live subscription registered under `id`
    #[must_use]
    pub fn cancel(id: impl Into<CancelId>) -> Self {
        Self::Cancel(id.into())
    }

    /// Run `work` synchronously at subscription time and emit nothing
    #[must_use]
    pub fn fire_and_forget<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::FireAndForget(Work::Sync(Box::new(work)))
    }

    /// Run `work` on the async runtime and emit nothing
    #[must_use]
    pub fn fire_and_forget_async<F>(work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::FireAndForget(Work::Async(Box::pin(work)))
    }

    /// Whether this is [`Effect::None`]
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Defer this effect's output by `duration` on `scheduler`
    #[must_use]
    pub fn delay(self, duration: Duration, scheduler: SchedulerRef) -> Self {
        Self::Delay {
            effect: Box::new(self),
            duration,
            scheduler,
        }
    }

    /// Deliver this effect's output on `scheduler`
    #[must_use]
    pub fn receive_on(self, scheduler: SchedulerRef) -> Self {
        Self::ReceiveOn {
            effect: Box::new(self),
            scheduler,
        }
    }

    /// Make this effect cancellable through `id`
    #[must_use]
    pub fn cancellable(self, id: impl Into<CancelId>) -> Self {
        Self::Cancellable {
            effect: Box::new(self),
            id: id.into(),
            cancel_in_flight: false,
        }
    }

    /// Make this effect cancellable through `id`, cancelling any subscription
    /// already running under that id first
    #[must_use]
    pub fn cancellable_in_flight(self, id: impl Into<CancelId>) -> Self {
        Self::Cancellable {
            effect: Box::new(self),
            id: id.into(),
            cancel_in_flight: true,
        }
    }

    /// Run this effect and `other` concurrently
    #[must_use]
    pub fn merge_with(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, effect) | (effect, Self::None) => effect,
            (Self::Merge(mut effects), other) => {
                effects.push(other);
                Self::Merge(effects)
            },
            (this, other) => Self::Merge(vec![this, other]),
        }
    }

    /// Run `other` after this effect completes
    #[must_use]
    pub fn concat_with(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, effect) | (effect, Self::None) => effect,
            (Self::Concatenate(mut effects), other) => {
                effects.push(other);
                Self::Concatenate(effects)
            },
            (this, other) => Self::Concatenate(vec![this, other]),
        }
    }
}

impl<A> Effect<A>
where
    A: Send + 'static,
{
    /// Run an async computation and feed its output back as an action
    #[must_use]
    pub fn task<F>(work: F) -> Self
    where
        F: Future<Output = A> + Send + 'static,
    {
        Self::Task(Box::pin(work.map(Some)))
    }

    /// Run an async computation that may or may not produce an action
    #[must_use]
    pub fn task_optional<F>(work: F) -> Self
    where
        F: Future<Output = Option<A>> + Send + 'static,
    {
        Self::Task(Box::pin(work))
    }

    /// Feed every item of `stream` back as an action
    #[must_use]
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = A> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Transform every action this effect emits
    ///
    /// Completion and cancellation are unaffected. The action type may change,
    /// which is how a child feature's effects are lifted into a parent's.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f: Arc<dyn Fn(A) -> B + Send + Sync> = Arc::new(f);
        self.map_shared(&f)
    }

    fn map_shared<B>(self, f: &Arc<dyn Fn(A) -> B + Send + Sync>) -> Effect<B>
    where
        B: Send + 'static,
    {
        match self {
            Self::None => Effect::None,
            Self::Value(action) => Effect::Value(f(action)),
            Self::Merge(effects) => {
                Effect::Merge(effects.into_iter().map(|e| e.map_shared(f)).collect())
            },
            Self::Concatenate(effects) => {
                Effect::Concatenate(effects.into_iter().map(|e| e.map_shared(f)).collect())
            },
            Self::Delay {
                effect,
                duration,
                scheduler,
            } => Effect::Delay {
                effect: Box::new(effect.map_shared(f)),
                duration,
                scheduler,
            },
            Self::ReceiveOn { effect, scheduler } => Effect::ReceiveOn {
                effect: Box::new(effect.map_shared(f)),
                scheduler,
            },
            Self::Cancellable {
                effect,
                id,
                cancel_in_flight,
            } => Effect::Cancellable {
                effect: Box::new(effect.map_shared(f)),
                id,
                cancel_in_flight,
            },
            Self::Cancel(id) => Effect::Cancel(id),
            Self::FireAndForget(work) => Effect::FireAndForget(work),
            Self::Task(future) => {
                let f = Arc::clone(f);
                Effect::Task(Box::pin(future.map(move |output| output.map(|a| f(a)))))
            },
            Self::Stream(stream) => {
                let f = Arc::clone(f);
                Effect::Stream(Box::pin(stream.map(move |a| f(a))))
            },
        }
    }
}

impl<A> Default for Effect<A> {
    fn default() -> Self {
        Self::None
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)] // Tests panic on unexpected variants

    use super::*;
    use crate::scheduler::{Job, RepeatingJob, Scheduler, TimerHandle};
    use futures::executor::block_on;
    use proptest::prelude::*;

    struct NeverScheduler;

    impl Scheduler for NeverScheduler {
        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn schedule(&self, _after: Duration, _job: Job) -> TimerHandle {
            TimerHandle::new()
        }

        fn schedule_repeating(
            &self,
            _after: Duration,
            _interval: Duration,
            _job: RepeatingJob,
        ) -> TimerHandle {
            TimerHandle::new()
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Child {
        Tick(u32),
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Parent {
        Child(Child),
    }

    #[test]
    fn test_map_rewrites_values_inside_combinators() {
        let scheduler: SchedulerRef = Arc::new(NeverScheduler);
        let effect = Effect::merge([
            Effect::value(Child::Tick(1)),
            Effect::value(Child::Tick(2)).delay(Duration::from_secs(1), scheduler),
            Effect::cancel("timer"),
        ])
        .cancellable("group");

        let mapped = effect.map(Parent::Child);

        let Effect::Cancellable { effect, id, .. } = mapped else {
            panic!("expected cancellable");
        };
        assert_eq!(id, CancelId::new("group"));
        let Effect::Merge(operands) = *effect else {
            panic!("expected merge");
        };
        assert!(matches!(&operands[0], Effect::Value(Parent::Child(Child::Tick(1)))));
        let Effect::Delay { effect, duration, .. } = &operands[1] else {
            panic!("expected delay");
        };
        assert_eq!(*duration, Duration::from_secs(1));
        assert!(matches!(**effect, Effect::Value(Parent::Child(Child::Tick(2)))));
        assert!(matches!(&operands[2], Effect::Cancel(_)));
    }

    #[test]
    fn test_map_applies_to_task_output() {
        let effect = Effect::task(async { Child::Tick(7) }).map(Parent::Child);
        let Effect::Task(future) = effect else {
            panic!("expected task");
        };
        assert_eq!(block_on(future), Some(Parent::Child(Child::Tick(7))));
    }

    #[test]
    fn test_map_keeps_empty_task_empty() {
        let effect = Effect::<Child>::task_optional(async { None }).map(Parent::Child);
        let Effect::Task(future) = effect else {
            panic!("expected task");
        };
        assert_eq!(block_on(future), None);
    }

    #[test]
    fn test_map_applies_to_stream_items() {
        let effect = Effect::stream(futures::stream::iter([Child::Tick(1), Child::Tick(2)]))
            .map(Parent::Child);
        let Effect::Stream(stream) = effect else {
            panic!("expected stream");
        };
        let items: Vec<_> = block_on(stream.collect());
        assert_eq!(
            items,
            vec![Parent::Child(Child::Tick(1)), Parent::Child(Child::Tick(2))]
        );
    }

    #[test]
    fn test_merge_with_skips_none_and_flattens() {
        let effect = Effect::none()
            .merge_with(Effect::value(1))
            .merge_with(Effect::value(2))
            .merge_with(Effect::none());
        let Effect::Merge(operands) = effect else {
            panic!("expected merge");
        };
        assert_eq!(operands.len(), 2);
    }

    #[test]
    fn test_concat_with_preserves_order() {
        let effect = Effect::value(1).concat_with(Effect::value(2)).concat_with(Effect::value(3));
        let Effect::Concatenate(operands) = effect else {
            panic!("expected concatenate");
        };
        let values: Vec<_> = operands
            .into_iter()
            .map(|e| match e {
                Effect::Value(v) => v,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_debug_output() {
        let effect: Effect<u8> = Effect::merge([
            Effect::value(1),
            Effect::task(async { 2 }),
            Effect::fire_and_forget(|| {}),
        ]);
        assert_eq!(
            format!("{effect:?}"),
            "Effect::Merge([Effect::Value(1), Effect::Task(<future>), Effect::FireAndForget(Work::Sync(<closure>))])"
        );
    }

    proptest! {
        #[test]
        fn prop_map_composes(x in any::<i32>()) {
            let composed = Effect::value(x)
                .map(|v: i32| i64::from(v) * 3)
                .map(|v: i64| v - 1);
            let direct = Effect::value(x).map(|v: i32| i64::from(v) * 3 - 1);
            match (composed, direct) {
                (Effect::Value(a), Effect::Value(b)) => prop_assert_eq!(a, b),
                _ => prop_assert!(false, "map must keep a value a value"),
            }
        }
    }
}
