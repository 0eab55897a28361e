//! Subscription lifetimes
//!
//! Every effect subscription runs under a [`Lifetime`]. Lifetimes form a tree:
//! a `cancellable` node opens a child of the lifetime it was subscribed under,
//! so cancelling a parent cancels everything beneath it. Cancellation is
//! one-way and idempotent.

use crate::lock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a registered cancel hook so it can be withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HookId(u64);

#[derive(Default)]
struct Hooks {
    next_id: u64,
    registered: BTreeMap<u64, Hook>,
}

pub(crate) struct Lifetime {
    cancelled: AtomicBool,
    children: Mutex<Vec<Weak<Lifetime>>>,
    hooks: Mutex<Hooks>,
}

impl Lifetime {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self::detached(false))
    }

    const fn detached(cancelled: bool) -> Self {
        Self {
            cancelled: AtomicBool::new(cancelled),
            children: Mutex::new(Vec::new()),
            hooks: Mutex::new(Hooks {
                next_id: 0,
                registered: BTreeMap::new(),
            }),
        }
    }

    /// Open a child lifetime. A child of a cancelled lifetime is born cancelled.
    pub(crate) fn child(self: &Arc<Self>) -> Arc<Self> {
        let mut children = lock(&self.children);
        if self.is_cancelled() {
            return Arc::new(Self::detached(true));
        }
        children.retain(|child| child.strong_count() > 0);
        let child = Arc::new(Self::detached(false));
        children.push(Arc::downgrade(&child));
        child
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel this lifetime and every descendant, running their hooks.
    pub(crate) fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let children = std::mem::take(&mut *lock(&self.children));
        let hooks = std::mem::take(&mut lock(&self.hooks).registered);

        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
        // Registration order
        for hook in hooks.into_values() {
            hook();
        }
    }

    /// Run `hook` when this lifetime is cancelled, or right away if it already is.
    ///
    /// Returns the id to [`forget`](Self::forget) the hook by, or `None` if it
    /// already ran.
    pub(crate) fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) -> Option<HookId> {
        let mut hooks = lock(&self.hooks);
        if self.is_cancelled() {
            drop(hooks);
            hook();
            return None;
        }
        let id = hooks.next_id;
        hooks.next_id += 1;
        hooks.registered.insert(id, Box::new(hook));
        Some(HookId(id))
    }

    /// Withdraw a hook whose work no longer needs cancelling
    pub(crate) fn forget(&self, id: HookId) {
        lock(&self.hooks).registered.remove(&id.0);
    }

    #[cfg(test)]
    pub(crate) fn hook_count(&self) -> usize {
        lock(&self.hooks).registered.len()
    }
}
