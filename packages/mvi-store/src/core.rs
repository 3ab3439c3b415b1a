//! Core traits and value types for the store.
//!
//! # Overview
//!
//! A store moves three kinds of values:
//! - [`MviState`] = the single current snapshot
//! - [`MviIntent`] = requests for a state transition
//! - [`MviAction`] = one-shot side-effect events for observers
//!
//! All three are plain values. The store never mutates them in place; a
//! transition replaces the current state with a new one.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// The current snapshot held by a store.
///
/// Automatically implemented for every `Clone + Debug + Send + Sync + 'static`
/// type, so plain enums and structs work without extra ceremony.
pub trait MviState: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> MviState for T {}

/// An immutable command describing a requested state transition.
pub trait MviIntent: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> MviIntent for T {}

/// An immutable one-shot event delivered through the action channel.
pub trait MviAction: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> MviAction for T {}

/// Identifier of one logical transaction chain.
///
/// A fresh `ChainId` is minted whenever the state guard is acquired. The
/// context handed to code running inside that transaction carries the id, so
/// a nested transaction started from the same chain is recognised and does
/// not wait on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(Uuid);

impl ChainId {
    /// Create a new random chain id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The old and proposed state handed to state hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition<S> {
    /// State before the transition.
    pub old: S,
    /// State the transition wants to publish.
    pub new: S,
}

impl<S> StateTransition<S> {
    pub fn new(old: S, new: S) -> Self {
        Self { old, new }
    }
}

/// Why a store stopped.
///
/// Passed to every stop hook exactly once per store lifetime.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// The store was closed, or its parent context was cancelled.
    Closed,
    /// The store terminated because an exception went unhandled.
    Failed(Arc<anyhow::Error>),
}

impl StopReason {
    /// Returns true if the store terminated abnormally.
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_))
    }

    /// The error that terminated the store, if any.
    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            StopReason::Closed => None,
            StopReason::Failed(e) => Some(e.as_ref()),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Closed => write!(f, "closed"),
            StopReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}
