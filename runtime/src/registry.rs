//! Cancellation registry
//!
//! Maps each [`CancelId`] to the subscriptions currently registered under it.
//! Entries leave the registry when their subscription completes or is
//! cancelled.

use crate::lifetime::Lifetime;
use crate::lock;
use statecraft_core::CancelId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct CancellationRegistry {
    inner: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    next_token: u64,
    by_id: HashMap<CancelId, HashMap<u64, Arc<Lifetime>>>,
}

impl CancellationRegistry {
    /// Register `lifetime` under `id`, returning the token that removes it.
    pub(crate) fn register(&self, id: CancelId, lifetime: Arc<Lifetime>) -> u64 {
        let mut entries = lock(&self.inner);
        let token = entries.next_token;
        entries.next_token += 1;
        entries.by_id.entry(id).or_default().insert(token, lifetime);
        token
    }

    pub(crate) fn deregister(&self, id: &CancelId, token: u64) {
        let mut entries = lock(&self.inner);
        if let Some(group) = entries.by_id.get_mut(id) {
            group.remove(&token);
            if group.is_empty() {
                entries.by_id.remove(id);
            }
        }
    }

    /// Cancel every subscription registered under `id`. Returns how many there were.
    pub(crate) fn cancel(&self, id: &CancelId) -> usize {
        // Hooks run by `Lifetime::cancel` deregister, so the lock must be released first.
        let group = lock(&self.inner).by_id.remove(id);
        let Some(group) = group else {
            return 0;
        };

        let count = group.len();
        for lifetime in group.into_values() {
            lifetime.cancel();
        }
        count
    }

    /// Number of live registrations across all ids
    pub(crate) fn live_count(&self) -> usize {
        lock(&self.inner).by_id.values().map(HashMap::len).sum()
    }
}
