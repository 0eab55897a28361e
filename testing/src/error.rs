//! Assertion results for the test store
//!
//! Every assertion resolves to one of three results: a pass, a pass with
//! tolerated mismatches (non-exhaustive assertions only), or a hard failure.

use std::fmt;
use thiserror::Error;

/// Something a non-exhaustive assertion noticed but did not fail on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The full state differed from the asserted update
    State {
        /// Action whose state was checked
        action: String,
        /// Expected vs actual state
        diff: String,
    },
    /// A received action was consumed without being asserted
    SkippedAction {
        /// The skipped action
        action: String,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State { action, diff } => {
                write!(f, "state after {action} was not fully asserted:\n{diff}")
            },
            Self::SkippedAction { action } => write!(f, "skipped received action {action}"),
        }
    }
}

/// Result of an assertion that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Everything matched
    Passed,
    /// The assertion held, but these mismatches were tolerated
    Tolerated(Vec<Mismatch>),
}

impl Outcome {
    pub(crate) fn from_mismatches(mismatches: Vec<Mismatch>) -> Self {
        if mismatches.is_empty() {
            Self::Passed
        } else {
            Self::Tolerated(mismatches)
        }
    }

    /// Whether nothing had to be tolerated
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// The tolerated mismatches, empty for [`Outcome::Passed`]
    #[must_use]
    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            Self::Passed => &[],
            Self::Tolerated(mismatches) => mismatches,
        }
    }
}

/// Hard assertion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestStoreError {
    /// State after an action did not match the asserted update
    #[error("State change does not match expectation after {action}: (- expected, + actual)\n{diff}")]
    StateMismatch {
        /// Action whose state was checked
        action: String,
        /// Expected vs actual state
        diff: String,
    },

    /// The next received action was not the expected one
    #[error("Received unexpected action: (- expected, + received)\n{diff}")]
    UnexpectedAction {
        /// Action the test expected
        expected: String,
        /// Action that was actually received
        received: String,
        /// Expected vs received action
        diff: String,
    },

    /// The received-action queue was empty
    #[error("Expected to receive {expected}, but received no action")]
    NothingReceived {
        /// Action the test expected
        expected: String,
    },

    /// No queued action matched (non-exhaustive receive)
    #[error("Expected to receive an action {expected}, but didn't get one")]
    MissingAction {
        /// Action the test expected
        expected: String,
    },

    /// An action was sent while received actions were still unasserted
    #[error("Must handle {} received action(s) before sending an action: {actions:?}", .actions.len())]
    UnhandledReceived {
        /// The unasserted actions, oldest first
        actions: Vec<String>,
    },

    /// Exhaustive teardown found unconsumed actions or live effects
    #[error(
        "Test store finished with {} unconsumed action(s) {unconsumed:?} and {leaked} in-flight effect(s)",
        .unconsumed.len()
    )]
    Teardown {
        /// Received actions never asserted
        unconsumed: Vec<String>,
        /// Effect subscriptions still running
        leaked: usize,
    },

    /// A strict drain found nothing to drain
    #[error("There were no received actions to skip")]
    NoActionsToSkip,
}
