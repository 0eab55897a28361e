//! Store runtime for coordinating reducer execution and effect handling.

use crate::engine::{Done, Emit, Engine};
use crate::lifetime::Lifetime;
use crate::metrics::StoreMetrics;
use crate::{StoreConfig, lock};
use statecraft_core::{CancelId, Reducer};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::Instant;
use tokio::sync::{Notify, broadcast};

/// Where an action entered the store from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionOrigin {
    /// Passed to [`Store::send`] by a caller
    Sent,
    /// Produced by an effect subscription
    Effect,
}

impl ActionOrigin {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Effect => "effect",
        }
    }
}

/// Hook invoked after every reduction with the post-reduction state
pub type Observer<S, A> = Box<dyn Fn(ActionOrigin, &A, &S) + Send + Sync + 'static>;

enum Origin {
    Sent,
    Effect(Arc<Lifetime>),
}

struct Envelope<A> {
    action: A,
    origin: Origin,
}

/// Single-consumer dispatch queue
struct Trampoline<A> {
    items: VecDeque<Envelope<A>>,
    draining: bool,
    drainer: Option<ThreadId>,
    enqueued: u64,
    processed: u64,
}

impl<A> Trampoline<A> {
    fn release(&mut self) {
        self.draining = false;
        self.drainer = None;
    }
}

impl<A> Default for Trampoline<A> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            draining: false,
            drainer: None,
            enqueued: 0,
            processed: 0,
        }
    }
}

struct Shared<S, A, E, R> {
    state: Mutex<S>,
    reducer: R,
    environment: E,
    config: StoreConfig,
    trampoline: Mutex<Trampoline<A>>,
    drained: Condvar,
    engine: Arc<Engine>,
    in_flight: Mutex<HashMap<u64, Arc<Lifetime>>>,
    next_effect: AtomicU64,
    observer: Option<Observer<S, A>>,
    action_broadcast: broadcast::Sender<A>,
    activity: Arc<Notify>,
}

/// The Store - runtime coordinator for a reducer
///
/// The Store manages:
/// 1. State (behind a mutex, touched only by the dispatching thread)
/// 2. Reducer (business logic)
/// 3. Environment (injected dependencies)
/// 4. Effect subscriptions (with feedback loop and cancellation registry)
///
/// Cloning a store is cheap; clones share everything.
///
/// # Type Parameters
///
/// - `S`: State type
/// - `A`: Action type
/// - `E`: Environment type
/// - `R`: Reducer implementation
///
/// # Example
///
/// ```
/// use statecraft_core::{reducer_fn, Effect};
/// use statecraft_runtime::Store;
///
/// #[derive(Clone, Debug)]
/// enum Action {
///     Increment,
///     IncrementTwice,
/// }
///
/// let reducer = reducer_fn(|count: &mut i32, action: Action, _env: &()| match action {
///     Action::Increment => {
///         *count += 1;
///         Effect::none()
///     },
///     Action::IncrementTwice => {
///         Effect::merge([Effect::value(Action::Increment), Effect::value(Action::Increment)])
///     },
/// });
///
/// let store = Store::new(0, reducer, ());
/// store.send(Action::IncrementTwice);
/// assert_eq!(store.state(|count| *count), 2);
/// ```
pub struct Store<S, A, E, R> {
    shared: Arc<Shared<S, A, E, R>>,
}

impl<S, A, E, R> Clone for Store<S, A, E, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Marks an envelope processed on drop, so waiting senders wake even if a reducer panics
struct TicketGuard<'a, A>(&'a Mutex<Trampoline<A>>, &'a Condvar);

impl<A> Drop for TicketGuard<'_, A> {
    fn drop(&mut self) {
        lock(self.0).processed += 1;
        self.1.notify_all();
    }
}

/// Releases the drainer role if the drainer unwinds
struct DrainGuard<'a, A>(&'a Mutex<Trampoline<A>>, &'a Condvar);

impl<A> Drop for DrainGuard<'_, A> {
    fn drop(&mut self) {
        let mut trampoline = lock(self.0);
        if trampoline.drainer == Some(thread::current().id()) {
            trampoline.release();
            drop(trampoline);
            self.1.notify_all();
        }
    }
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Send + 'static,
    A: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment
    ///
    /// Uses [`StoreConfig::default`].
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::build(initial_state, reducer, environment, StoreConfig::default(), None)
    }

    /// Create a new Store with custom configuration
    #[must_use]
    pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
        Self::build(initial_state, reducer, environment, config, None)
    }

    /// Create a new Store that reports every reduction to `observer`
    ///
    /// The observer runs on the dispatching thread right after the reducer,
    /// with the action and the state it produced. Follow-on actions have not
    /// been processed yet. It must not call back into the store.
    #[must_use]
    pub fn with_observer(
        initial_state: S,
        reducer: R,
        environment: E,
        config: StoreConfig,
        observer: impl Fn(ActionOrigin, &A, &S) + Send + Sync + 'static,
    ) -> Self {
        Self::build(
            initial_state,
            reducer,
            environment,
            config,
            Some(Box::new(observer)),
        )
    }

    fn build(
        initial_state: S,
        reducer: R,
        environment: E,
        config: StoreConfig,
        observer: Option<Observer<S, A>>,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let activity = Arc::new(Notify::new());

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(initial_state),
                reducer,
                environment,
                config,
                trampoline: Mutex::new(Trampoline::default()),
                drained: Condvar::new(),
                engine: Arc::new(Engine::new(Arc::clone(&activity))),
                in_flight: Mutex::new(HashMap::new()),
                next_effect: AtomicU64::new(0),
                observer,
                action_broadcast,
                activity,
            }),
        }
    }

    /// Send an action to the store
    ///
    /// Applies the reducer exactly once, then subscribes the returned effect.
    /// Actions the effect produces synchronously, and all of their follow-on
    /// actions, are processed before `send` returns. Work deferred onto a
    /// scheduler or an async task feeds back later.
    ///
    /// Reducer invocations never overlap. When another thread is currently
    /// dispatching, this call waits until the action has been processed. When
    /// called from inside dispatch (a synchronous job or observer on the
    /// dispatching thread) the action is queued and processed after the
    /// current one.
    ///
    /// # Panics
    ///
    /// If the reducer panics, the panic propagates to the caller. The store
    /// stays usable.
    #[tracing::instrument(skip(self, action), fields(store = %self.shared.config.name), name = "store_send")]
    pub fn send(&self, action: A) {
        self.shared.dispatch(Envelope {
            action,
            origin: Origin::Sent,
        });
    }

    /// Read current state via a closure
    ///
    /// Must not be called from a reducer or observer.
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        f(&lock(&self.shared.state))
    }

    /// Clone the current state
    #[must_use]
    pub fn snapshot(&self) -> S
    where
        S: Clone,
    {
        self.state(S::clone)
    }

    /// Subscribe to actions produced by effects
    ///
    /// Actions passed to [`send`](Self::send) are not broadcast.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.shared.action_broadcast.subscribe()
    }

    /// Number of effect subscriptions that have not completed yet
    #[must_use]
    pub fn in_flight_effects(&self) -> usize {
        lock(&self.shared.in_flight).len()
    }

    /// Number of subscriptions currently registered under a cancel id
    #[must_use]
    pub fn live_cancellables(&self) -> usize {
        self.shared.engine.registry().live_count()
    }

    /// Number of async effect tasks still running
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.shared.engine.pending_tasks()
    }

    /// Signalled whenever an effect action is processed or an async task ends
    #[must_use]
    pub fn activity(&self) -> Arc<Notify> {
        Arc::clone(&self.shared.activity)
    }

    /// Cancel every subscription registered under `id`
    ///
    /// Returns how many subscriptions were cancelled.
    pub fn cancel(&self, id: impl Into<CancelId>) -> usize {
        let id = id.into();
        let cancelled = self.shared.engine.registry().cancel(&id);
        tracing::debug!(%id, cancelled, "Cancelled effects");
        cancelled
    }

    /// Cancel every in-flight effect subscription
    ///
    /// Returns how many top-level subscriptions were cancelled.
    pub fn cancel_in_flight_effects(&self) -> usize {
        let in_flight: Vec<_> = lock(&self.shared.in_flight).drain().map(|(_, l)| l).collect();
        StoreMetrics::record_in_flight(0);
        let count = in_flight.len();
        for lifetime in in_flight {
            lifetime.cancel();
        }
        if count > 0 {
            tracing::debug!(count, "Cancelled in-flight effects");
        }
        count
    }
}

impl<S, A, E, R> Shared<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Send + 'static,
    A: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    fn dispatch(self: &Arc<Self>, envelope: Envelope<A>) {
        let external = matches!(envelope.origin, Origin::Sent);
        let me = thread::current().id();

        let mut trampoline = lock(&self.trampoline);
        trampoline.items.push_back(envelope);
        trampoline.enqueued += 1;
        let ticket = trampoline.enqueued;

        if trampoline.draining {
            if !external || trampoline.drainer == Some(me) {
                return;
            }
            tracing::debug!("Another thread is dispatching, waiting for action to be processed");
            // Waiting for the drainer to go idle also covers this action's follow-ons
            while trampoline.draining {
                trampoline = self
                    .drained
                    .wait(trampoline)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if trampoline.processed >= ticket {
                return;
            }
        }

        trampoline.draining = true;
        trampoline.drainer = Some(me);
        drop(trampoline);

        self.drain();
    }

    fn drain(self: &Arc<Self>) {
        let _drainer = DrainGuard(&self.trampoline, &self.drained);
        loop {
            let envelope = {
                let mut trampoline = lock(&self.trampoline);
                let Some(envelope) = trampoline.items.pop_front() else {
                    // Released under the same lock as the empty check, so no enqueue is missed
                    trampoline.release();
                    drop(trampoline);
                    self.drained.notify_all();
                    return;
                };
                envelope
            };
            let _ticket = TicketGuard(&self.trampoline, &self.drained);
            self.process(envelope);
        }
    }

    fn process(self: &Arc<Self>, envelope: Envelope<A>) {
        let Envelope { action, origin } = envelope;

        let origin = match origin {
            Origin::Sent => ActionOrigin::Sent,
            Origin::Effect(lifetime) => {
                if lifetime.is_cancelled() {
                    tracing::trace!("Discarding action from cancelled effect");
                    StoreMetrics::record_discarded();
                    return;
                }
                ActionOrigin::Effect
            },
        };

        tracing::trace!(origin = origin.as_str(), "Reducing action");
        let observed = action.clone();
        let effect = {
            let mut state = lock(&self.state);
            let start = Instant::now();
            let effect = self.reducer.reduce(&mut state, action, &self.environment);
            StoreMetrics::record_action(origin.as_str(), start.elapsed());

            if let Some(observer) = &self.observer {
                observer(origin, &observed, &state);
            }
            effect
        };

        if origin == ActionOrigin::Effect {
            // No receivers is fine
            let _ = self.action_broadcast.send(observed);
            self.activity.notify_waiters();
        }

        if effect.is_none() {
            return;
        }

        let id = self.next_effect.fetch_add(1, Ordering::Relaxed);
        let root = Lifetime::root();
        {
            let mut in_flight = lock(&self.in_flight);
            in_flight.insert(id, Arc::clone(&root));
            StoreMetrics::record_in_flight(in_flight.len());
        }

        let emit: Emit<A> = {
            let shared = Arc::downgrade(self);
            Arc::new(move |action: A, source: &Arc<Lifetime>| {
                if let Some(shared) = shared.upgrade() {
                    shared.dispatch(Envelope {
                        action,
                        origin: Origin::Effect(Arc::clone(source)),
                    });
                }
            })
        };
        let done: Done = {
            let shared: Weak<Self> = Arc::downgrade(self);
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    let mut in_flight = lock(&shared.in_flight);
                    in_flight.remove(&id);
                    StoreMetrics::record_in_flight(in_flight.len());
                }
            })
        };

        self.engine.subscribe(effect, &root, emit, done);
    }
}
