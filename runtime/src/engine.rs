//! Subscription engine
//!
//! Interprets an [`Effect`] tree. Each node receives the lifetime it runs
//! under, an `emit` callback for the actions it produces and a `done`
//! callback for its terminal signal. A node whose lifetime is cancelled
//! neither emits nor completes; `cancellable` nodes complete their parent
//! when their own lifetime is cancelled, so sequencing continues past them.

use crate::lifetime::{HookId, Lifetime};
use crate::lock;
use crate::metrics::EffectMetrics;
use crate::registry::CancellationRegistry;
use futures::StreamExt;
use statecraft_core::{Effect, SchedulerRef, Work};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Delivers an action produced under the given lifetime
pub(crate) type Emit<A> = Arc<dyn Fn(A, &Arc<Lifetime>) + Send + Sync + 'static>;

/// Terminal signal of a subscription
pub(crate) type Done = Box<dyn FnOnce() + Send + 'static>;

/// Guard that decrements the pending task counter on drop, even if the task is aborted
struct PendingTaskGuard {
    pending: Arc<AtomicUsize>,
    activity: Arc<Notify>,
}

impl Drop for PendingTaskGuard {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        EffectMetrics::record_pending_tasks(self.pending.load(Ordering::SeqCst));
        self.activity.notify_waiters();
    }
}

/// Shared once-only terminal signal
#[derive(Clone)]
struct DoneSlot(Arc<Mutex<Option<Done>>>);

impl DoneSlot {
    fn new(done: Done) -> Self {
        Self(Arc::new(Mutex::new(Some(done))))
    }

    fn fire(&self) {
        let done = lock(&self.0).take();
        if let Some(done) = done {
            done();
        }
    }
}

/// Cancel hook of a single scheduled job or spawned task.
///
/// The hook is withdrawn from the lifetime once the work has run, so a
/// long-lived subscription does not accumulate one hook per emission. The
/// work may finish before the hook is installed; it is then never installed.
struct CancelHook {
    lifetime: Arc<Lifetime>,
    state: Mutex<HookState>,
}

enum HookState {
    Pending,
    Installed(HookId),
    Finished,
}

impl CancelHook {
    fn new(lifetime: &Arc<Lifetime>) -> Arc<Self> {
        Arc::new(Self {
            lifetime: Arc::clone(lifetime),
            state: Mutex::new(HookState::Pending),
        })
    }

    fn install(&self, hook: impl FnOnce() + Send + 'static) {
        let mut state = lock(&self.state);
        if matches!(*state, HookState::Pending) {
            if let Some(id) = self.lifetime.on_cancel(hook) {
                *state = HookState::Installed(id);
            }
        }
    }

    fn finish(&self) {
        let previous = std::mem::replace(&mut *lock(&self.state), HookState::Finished);
        if let HookState::Installed(id) = previous {
            self.lifetime.forget(id);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.lifetime.is_cancelled()
    }
}

pub(crate) struct Engine {
    registry: Arc<CancellationRegistry>,
    pending_tasks: Arc<AtomicUsize>,
    activity: Arc<Notify>,
}

impl Engine {
    pub(crate) fn new(activity: Arc<Notify>) -> Self {
        Self {
            registry: Arc::new(CancellationRegistry::default()),
            pending_tasks: Arc::new(AtomicUsize::new(0)),
            activity,
        }
    }

    pub(crate) fn registry(&self) -> &CancellationRegistry {
        &self.registry
    }

    pub(crate) fn pending_tasks(&self) -> usize {
        self.pending_tasks.load(Ordering::SeqCst)
    }

    /// Subscribe to `effect` under `lifetime`.
    pub(crate) fn subscribe<A>(
        self: &Arc<Self>,
        effect: Effect<A>,
        lifetime: &Arc<Lifetime>,
        emit: Emit<A>,
        done: Done,
    ) where
        A: Send + 'static,
    {
        if lifetime.is_cancelled() {
            return;
        }

        let kind = kind_of(&effect);
        tracing::trace!(kind, "Subscribing effect");
        EffectMetrics::record_subscribed(kind);

        match effect {
            Effect::None => done(),

            Effect::Value(action) => {
                emit(action, lifetime);
                done();
            },

            Effect::Merge(effects) => self.subscribe_merge(effects, lifetime, &emit, done),

            Effect::Concatenate(effects) => {
                self.subscribe_sequence(effects.into(), Arc::clone(lifetime), emit, done);
            },

            Effect::Delay {
                effect,
                duration,
                scheduler,
            } => self.subscribe_deferred(*effect, duration, scheduler, lifetime, emit, done),

            Effect::ReceiveOn { effect, scheduler } => {
                self.subscribe_deferred(*effect, Duration::ZERO, scheduler, lifetime, emit, done);
            },

            Effect::Cancellable {
                effect,
                id,
                cancel_in_flight,
            } => {
                if cancel_in_flight {
                    let cancelled = self.registry.cancel(&id);
                    if cancelled > 0 {
                        tracing::debug!(%id, cancelled, "Cancelled in-flight effects");
                        EffectMetrics::record_cancelled(cancelled);
                    }
                }

                let child = lifetime.child();
                let token = self.registry.register(id.clone(), Arc::clone(&child));
                let slot = DoneSlot::new(done);

                {
                    let registry = Arc::downgrade(&self.registry);
                    let id = id.clone();
                    let slot = slot.clone();
                    child.on_cancel(move || {
                        if let Some(registry) = registry.upgrade() {
                            registry.deregister(&id, token);
                        }
                        slot.fire();
                    });
                }

                let registry = Arc::downgrade(&self.registry);
                self.subscribe(
                    *effect,
                    &child,
                    emit,
                    Box::new(move || {
                        if let Some(registry) = registry.upgrade() {
                            registry.deregister(&id, token);
                        }
                        slot.fire();
                    }),
                );
            },

            Effect::Cancel(id) => {
                let cancelled = self.registry.cancel(&id);
                tracing::debug!(%id, cancelled, "Cancelled effects");
                EffectMetrics::record_cancelled(cancelled);
                done();
            },

            Effect::FireAndForget(Work::Sync(work)) => {
                work();
                done();
            },

            Effect::FireAndForget(Work::Async(work)) => {
                self.spawn("fire_and_forget", lifetime, work, done);
            },

            Effect::Task(task) => {
                let source = Arc::clone(lifetime);
                self.spawn(
                    "task",
                    lifetime,
                    async move {
                        if let Some(action) = task.await {
                            if !source.is_cancelled() {
                                emit(action, &source);
                            }
                        }
                    },
                    done,
                );
            },

            Effect::Stream(mut stream) => {
                let source = Arc::clone(lifetime);
                self.spawn(
                    "stream",
                    lifetime,
                    async move {
                        while let Some(action) = stream.next().await {
                            if source.is_cancelled() {
                                break;
                            }
                            emit(action, &source);
                        }
                    },
                    done,
                );
            },
        }
    }

    fn subscribe_merge<A>(
        self: &Arc<Self>,
        effects: Vec<Effect<A>>,
        lifetime: &Arc<Lifetime>,
        emit: &Emit<A>,
        done: Done,
    ) where
        A: Send + 'static,
    {
        if effects.is_empty() {
            done();
            return;
        }

        let remaining = Arc::new(AtomicUsize::new(effects.len()));
        let slot = DoneSlot::new(done);
        for effect in effects {
            let remaining = Arc::clone(&remaining);
            let slot = slot.clone();
            self.subscribe(
                effect,
                lifetime,
                Arc::clone(emit),
                Box::new(move || {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        slot.fire();
                    }
                }),
            );
        }
    }

    fn subscribe_sequence<A>(
        self: &Arc<Self>,
        mut rest: VecDeque<Effect<A>>,
        lifetime: Arc<Lifetime>,
        emit: Emit<A>,
        done: Done,
    ) where
        A: Send + 'static,
    {
        let Some(head) = rest.pop_front() else {
            done();
            return;
        };

        let engine = Arc::clone(self);
        let next_lifetime = Arc::clone(&lifetime);
        let next_emit = Arc::clone(&emit);
        self.subscribe(
            head,
            &lifetime,
            emit,
            Box::new(move || engine.subscribe_sequence(rest, next_lifetime, next_emit, done)),
        );
    }

    /// Shift every emission and the completion of `effect` onto `scheduler`.
    fn subscribe_deferred<A>(
        self: &Arc<Self>,
        effect: Effect<A>,
        after: Duration,
        scheduler: SchedulerRef,
        lifetime: &Arc<Lifetime>,
        emit: Emit<A>,
        done: Done,
    ) where
        A: Send + 'static,
    {
        let deferred_emit: Emit<A> = {
            let scheduler = Arc::clone(&scheduler);
            Arc::new(move |action: A, source: &Arc<Lifetime>| {
                let emit = Arc::clone(&emit);
                let hook = CancelHook::new(source);
                let fired = Arc::clone(&hook);
                let timer = scheduler.schedule(
                    after,
                    Box::new(move || {
                        fired.finish();
                        if !fired.is_cancelled() {
                            emit(action, &fired.lifetime);
                        }
                    }),
                );
                hook.install(move || timer.cancel());
            })
        };

        let deferred_done: Done = {
            let lifetime = Arc::clone(lifetime);
            Box::new(move || {
                let hook = CancelHook::new(&lifetime);
                let fired = Arc::clone(&hook);
                let timer = scheduler.schedule(
                    after,
                    Box::new(move || {
                        fired.finish();
                        if !fired.is_cancelled() {
                            done();
                        }
                    }),
                );
                hook.install(move || timer.cancel());
            })
        };

        self.subscribe(effect, lifetime, deferred_emit, deferred_done);
    }

    /// Run `work` on the ambient Tokio runtime, completing when it resolves.
    fn spawn<F>(self: &Arc<Self>, kind: &'static str, lifetime: &Arc<Lifetime>, work: F, done: Done)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(kind, "No Tokio runtime available, effect treated as completed");
            EffectMetrics::record_failure(kind);
            done();
            return;
        };

        let pending = self.pending_tasks.fetch_add(1, Ordering::SeqCst) + 1;
        EffectMetrics::record_pending_tasks(pending);
        let guard = PendingTaskGuard {
            pending: Arc::clone(&self.pending_tasks),
            activity: Arc::clone(&self.activity),
        };

        let hook = CancelHook::new(lifetime);
        let finished = Arc::clone(&hook);
        let task = handle.spawn(async move {
            let _guard = guard;
            work.await;
            finished.finish();
            if !finished.is_cancelled() {
                done();
            }
        });

        let abort = task.abort_handle();
        hook.install(move || abort.abort());
    }
}

const fn kind_of<A>(effect: &Effect<A>) -> &'static str {
    match effect {
        Effect::None => "none",
        Effect::Value(_) => "value",
        Effect::Merge(_) => "merge",
        Effect::Concatenate(_) => "concatenate",
        Effect::Delay { .. } => "delay",
        Effect::ReceiveOn { .. } => "receive_on",
        Effect::Cancellable { .. } => "cancellable",
        Effect::Cancel(_) => "cancel",
        Effect::FireAndForget(_) => "fire_and_forget",
        Effect::Task(_) => "task",
        Effect::Stream(_) => "stream",
    }
}
