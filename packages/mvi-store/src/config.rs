//! Store configuration.
//!
//! `StoreConfiguration` is an immutable record of behavior flags. It derives
//! serde traits with `#[serde(default)]`, so a host application can embed it
//! in its own JSON or TOML configuration and only spell out what differs from
//! the defaults.
//!
//! ```ignore
//! let config = StoreConfiguration::default()
//!     .with_name("counter")
//!     .with_parallel_intents(true)
//!     .with_action_share_behavior(ActionShareBehavior::Share {
//!         buffer_size: 16,
//!         replay: 1,
//!         overflow: BufferOverflow::DropOldest,
//!     });
//! ```

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Default capacity of the intent queue.
pub const DEFAULT_INTENT_CAPACITY: usize = 64;

/// Default buffer size of the action channel.
pub const DEFAULT_ACTION_BUFFER: usize = 64;

/// What happens when a bounded buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferOverflow {
    /// Suspend the producer until space frees up.
    #[default]
    Suspend,
    /// Evict the oldest buffered item. Evicted items are reported to the
    /// undelivered hooks.
    DropOldest,
}

/// How actions are delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "discipline", rename_all = "snake_case")]
pub enum ActionShareBehavior {
    /// Competing consumers: each action goes to exactly one subscriber.
    Distribute {
        buffer_size: usize,
        overflow: BufferOverflow,
    },
    /// Like `Distribute`, but only one subscriber may be attached at a time.
    Restrict {
        buffer_size: usize,
        overflow: BufferOverflow,
    },
    /// Broadcast to every subscriber, replaying the last `replay` actions to
    /// newcomers.
    Share {
        buffer_size: usize,
        replay: usize,
        overflow: BufferOverflow,
    },
    /// Actions are not supported; emitting one is an error.
    Disabled,
}

impl Default for ActionShareBehavior {
    fn default() -> Self {
        ActionShareBehavior::Distribute {
            buffer_size: DEFAULT_ACTION_BUFFER,
            overflow: BufferOverflow::Suspend,
        }
    }
}

impl ActionShareBehavior {
    fn buffer_size(&self) -> Option<usize> {
        match self {
            ActionShareBehavior::Distribute { buffer_size, .. }
            | ActionShareBehavior::Restrict { buffer_size, .. }
            | ActionShareBehavior::Share { buffer_size, .. } => Some(*buffer_size),
            ActionShareBehavior::Disabled => None,
        }
    }
}

/// How state transactions are protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StateStrategy {
    /// Every read-modify-write goes through the state guard.
    Guarded {
        /// Allow nested transactions on the same chain.
        reentrant: bool,
    },
    /// No guard at all. Concurrent updates may overwrite each other.
    Immediate,
}

impl Default for StateStrategy {
    fn default() -> Self {
        StateStrategy::Guarded { reentrant: true }
    }
}

/// Immutable record of store behavior flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfiguration {
    /// Name used in logs. Defaults to `"store"` when absent.
    pub name: Option<String>,
    /// Turns on decorator verification and unhandled-intent errors.
    pub debuggable: bool,
    /// Process each intent in its own task instead of one after another.
    pub parallel_intents: bool,
    /// Capacity of the intent queue.
    pub intent_capacity: usize,
    /// Overflow policy of the intent queue.
    pub on_overflow: BufferOverflow,
    /// Delivery discipline for actions.
    pub action_share_behavior: ActionShareBehavior,
    /// How state transactions are protected.
    pub state_strategy: StateStrategy,
    /// Explicit override for decorator verification. Follows `debuggable`
    /// when unset.
    pub verify_decorators: Option<bool>,
}

impl Default for StoreConfiguration {
    fn default() -> Self {
        Self {
            name: None,
            debuggable: false,
            parallel_intents: false,
            intent_capacity: DEFAULT_INTENT_CAPACITY,
            on_overflow: BufferOverflow::Suspend,
            action_share_behavior: ActionShareBehavior::default(),
            state_strategy: StateStrategy::default(),
            verify_decorators: None,
        }
    }
}

impl StoreConfiguration {
    /// Set the store name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable debug checks.
    pub fn with_debuggable(mut self, debuggable: bool) -> Self {
        self.debuggable = debuggable;
        self
    }

    /// Process intents concurrently.
    pub fn with_parallel_intents(mut self, parallel: bool) -> Self {
        self.parallel_intents = parallel;
        self
    }

    /// Set the intent queue capacity and overflow policy.
    pub fn with_intent_buffer(mut self, capacity: usize, overflow: BufferOverflow) -> Self {
        self.intent_capacity = capacity;
        self.on_overflow = overflow;
        self
    }

    /// Set the action delivery discipline.
    pub fn with_action_share_behavior(mut self, behavior: ActionShareBehavior) -> Self {
        self.action_share_behavior = behavior;
        self
    }

    /// Set the state transaction strategy.
    pub fn with_state_strategy(mut self, strategy: StateStrategy) -> Self {
        self.state_strategy = strategy;
        self
    }

    /// Force decorator verification on or off regardless of `debuggable`.
    pub fn with_verify_decorators(mut self, verify: bool) -> Self {
        self.verify_decorators = Some(verify);
        self
    }

    /// Whether decorators are checked for the proceed contract.
    pub fn effective_verification(&self) -> bool {
        self.verify_decorators.unwrap_or(self.debuggable)
    }

    /// The name to use in logs.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("store")
    }

    /// Check that the configuration can back a store.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.intent_capacity == 0 {
            return Err(StoreError::InvalidConfiguration {
                reason: "intent_capacity must be at least 1".into(),
            });
        }
        if self.action_share_behavior.buffer_size() == Some(0) {
            return Err(StoreError::InvalidConfiguration {
                reason: "action buffer_size must be at least 1".into(),
            });
        }
        Ok(())
    }
}
