//! Value-typed identities used to group and cancel effect subscriptions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifier that groups live effect subscriptions for cancellation.
///
/// Any number of subscriptions may share one id; cancelling the id disposes
/// all of them. Ids compare by value, so two ids built from the same name
/// refer to the same group.
///
/// # Example
///
/// ```
/// use statecraft_core::CancelId;
///
/// let fetch = CancelId::new("fetch");
/// assert_eq!(fetch, CancelId::from("fetch"));
/// assert_ne!(CancelId::unique(), CancelId::unique());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CancelId(Repr);

#[derive(Clone, PartialEq, Eq, Hash)]
enum Repr {
    Named(Arc<str>),
    Token(u64),
}

impl CancelId {
    /// Create an id from a name
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(Repr::Named(name.into()))
    }

    /// Generate an id that is distinct from every other id in this process
    #[must_use]
    pub fn unique() -> Self {
        Self(Repr::Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)))
    }
}

impl From<&'static str> for CancelId {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for CancelId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for CancelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Named(name) => write!(f, "{name}"),
            Repr::Token(token) => write!(f, "#{token}"),
        }
    }
}

impl fmt::Debug for CancelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancelId({self})")
    }
}
