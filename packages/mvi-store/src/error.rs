//! Structured error types for the store.
//!
//! `StoreError` provides pattern-matchable errors instead of generic `anyhow::Error`.
//!
//! # The Error Boundary Rule
//!
//! - `anyhow` is internal transport (ergonomic for reducers and plugins)
//! - `StoreError` is what the store itself raises
//!
//! Every error falls into one [`ErrorKind`]:
//!
//! | Kind      | Raised by                           | Recoverable via exception hook? | Fatal? |
//! |-----------|-------------------------------------|---------------------------------|--------|
//! | Domain    | reducer and plugin code             | yes                             | only if unhandled |
//! | Lifecycle | start / subscribe / unsubscribe      | yes                             | never  |
//! | Contract  | decorators, restricted subscribers  | no                              | in the reducer path |
//!
//! # Example
//!
//! ```ignore
//! use mvi_store::StoreError;
//!
//! match store.subscribe() {
//!     Ok(subscription) => render(subscription),
//!     Err(StoreError::SubscriberAlreadyAttached) => {
//!         tracing::warn!("store only allows one subscriber");
//!     }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Classification of a failure, used to decide how the store reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while reducing an intent. Recoverable through the exception
    /// hook chain, fatal to the store only if nobody handles it.
    Domain,
    /// Raised by start, subscribe or unsubscribe hooks. Always supervised.
    Lifecycle,
    /// A programmer error such as skipping `proceed`. Never offered to
    /// recovery plugins.
    Contract,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Domain => write!(f, "domain"),
            ErrorKind::Lifecycle => write!(f, "lifecycle"),
            ErrorKind::Contract => write!(f, "contract"),
        }
    }
}

/// Structured error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A decorator returned without calling `proceed` exactly once.
    #[error("decorator {decorator} violated the proceed contract in {hook}: proceed called {calls} times")]
    ProceedContractViolated {
        /// Name of the offending decorator.
        decorator: String,
        /// Hook the decorator was wrapping.
        hook: &'static str,
        /// How many times `proceed` was called.
        calls: usize,
    },

    /// A second subscriber tried to attach to a `Restrict` action channel.
    #[error("action channel is restricted to a single subscriber and one is already attached")]
    SubscriberAlreadyAttached,

    /// An action was emitted while action delivery is disabled.
    #[error("actions are disabled for this store")]
    ActionsDisabled,

    /// A nested state transaction was attempted under a non-reentrant guard.
    #[error("nested state transaction on a non-reentrant guard")]
    RecursiveTransaction,

    /// The store is closed and cannot accept the operation.
    #[error("store is closed")]
    StoreClosed,

    /// The store was already started once.
    #[error("store was already started; stores are single-use")]
    AlreadyStarted,

    /// The intent queue is full and the overflow policy suspends producers.
    #[error("intent buffer is full")]
    IntentBufferFull,

    /// An intent survived the plugin chain but no reducer is installed.
    #[error("no reducer handled intent {intent}")]
    UnhandledIntent {
        /// Debug rendering of the intent.
        intent: String,
    },

    /// Two plugins were installed under the same name.
    #[error("plugin {name} is already installed")]
    DuplicatePlugin {
        /// The duplicated plugin name.
        name: String,
    },

    /// The configuration cannot be used to build a store.
    #[error("invalid store configuration: {reason}")]
    InvalidConfiguration {
        /// What is wrong with it.
        reason: String,
    },

    /// A handler panicked; the panic was caught and converted.
    #[error("handler panicked: {message}")]
    HandlerPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// A wrapped hook did not finish in time.
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// How long we waited.
        duration: std::time::Duration,
    },
}

impl StoreError {
    /// The kind of failure this error represents.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ProceedContractViolated { .. }
            | StoreError::SubscriberAlreadyAttached
            | StoreError::ActionsDisabled
            | StoreError::RecursiveTransaction
            | StoreError::DuplicatePlugin { .. }
            | StoreError::InvalidConfiguration { .. } => ErrorKind::Contract,
            StoreError::StoreClosed | StoreError::AlreadyStarted => ErrorKind::Lifecycle,
            StoreError::IntentBufferFull
            | StoreError::UnhandledIntent { .. }
            | StoreError::HandlerPanicked { .. }
            | StoreError::Timeout { .. } => ErrorKind::Domain,
        }
    }

    /// Returns true for programmer-contract violations.
    pub fn is_contract_violation(&self) -> bool {
        self.kind() == ErrorKind::Contract
    }
}

/// Returns true if an arbitrary error is (or wraps) a contract violation.
pub fn is_contract_violation(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<StoreError>())
        .any(StoreError::is_contract_violation)
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Convert a caught panic into an error that can travel through the chain.
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    StoreError::HandlerPanicked {
        message: panic_message(payload.as_ref()),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proceed_violation_display() {
        let err = StoreError::ProceedContractViolated {
            decorator: "timing".into(),
            hook: "on_intent",
            calls: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("timing"));
        assert!(msg.contains("on_intent"));
        assert!(msg.contains("0 times"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            StoreError::SubscriberAlreadyAttached.kind(),
            ErrorKind::Contract
        );
        assert_eq!(StoreError::StoreClosed.kind(), ErrorKind::Lifecycle);
        assert_eq!(StoreError::IntentBufferFull.kind(), ErrorKind::Domain);
        assert_eq!(
            StoreError::Timeout {
                duration: std::time::Duration::from_secs(1)
            }
            .kind(),
            ErrorKind::Domain
        );
    }

    #[test]
    fn test_contract_violation_detected_through_anyhow() {
        let err: anyhow::Error = StoreError::ProceedContractViolated {
            decorator: "d".into(),
            hook: "on_state",
            calls: 2,
        }
        .into();
        assert!(is_contract_violation(&err));

        let wrapped = err.context("while reducing intent");
        assert!(is_contract_violation(&wrapped));

        let domain = anyhow::anyhow!("network down");
        assert!(!is_contract_violation(&domain));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_error_can_be_downcast_from_anyhow() {
        let err: anyhow::Error = StoreError::DuplicatePlugin {
            name: "logging".into(),
        }
        .into();

        match err.downcast_ref::<StoreError>() {
            Some(StoreError::DuplicatePlugin { name }) => assert_eq!(name, "logging"),
            _ => panic!("Expected DuplicatePlugin"),
        }
    }
}
