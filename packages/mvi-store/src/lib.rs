//! # mvi-store
//!
//! A single-writer, event-driven state store: intents reduce state, plugins
//! intercept, decorators wrap.
//!
//! ## Core Concepts
//!
//! - **Intent** = a request for a state transition
//! - **State** = the single current immutable snapshot
//! - **Action** = a one-shot side-effect event for subscribers
//!
//! Cross-cutting behavior is composed around the reducer instead of inside it:
//! - [`StorePlugin`] = a named bundle of optional hooks, folded in
//!   installation order
//! - [`PluginDecorator`] = an onion layer around the folded hooks, gated by an
//!   explicit `proceed` continuation
//!
//! ## Architecture
//!
//! ```text
//! send(intent)
//!     │
//!     ▼
//! intent queue (bounded, suspend | drop-oldest)
//!     │
//!     ▼ reducer loop (sequential, or one task per intent)
//! decorators ─► plugins.on_intent ─► None? ─► dropped
//!     │
//!     ▼
//! reducer(ctx, intent)
//!     │
//!     ├─► ctx.update_state(f) ─► StateGuard ─► plugins.on_state ─► publish
//!     │
//!     └─► ctx.action(a) ─► plugins.on_action ─► ActionChannel
//!                                                  │
//!                            Distribute / Restrict / Share(replay)
//!                                                  │
//!                                                  ▼
//!                                             subscribers
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One writer** - every read-modify-write goes through the state guard
//! 2. **Ordered hooks** - forward hooks run in installation order, stop hooks
//!    in exact reverse
//! 3. **Nothing lost silently** - intents and actions that were accepted but
//!    never delivered reach the undelivered hooks
//! 4. **Single use** - a closed store cannot be restarted
//!
//! ## Guarantees
//!
//! - **Sequential by default**: published states are consistent with applying
//!   intents in send order
//! - **No lost updates**: in parallel mode every update still serializes
//!   through the guard
//! - **Fail loudly**: an exception no plugin handles stops the store
//!
//! ## Example
//!
//! ```ignore
//! use mvi_store::{logging_plugin, Store, StoreConfiguration};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone)]
//! enum CounterIntent {
//!     Increment,
//!     Reset,
//! }
//!
//! #[derive(Debug, Clone)]
//! enum CounterAction {
//!     LimitReached,
//! }
//!
//! let store = Store::builder(0u32)
//!     .configure(StoreConfiguration::default().with_name("counter"))
//!     .install(logging_plugin("counter"))
//!     .reduce(|ctx, intent| async move {
//!         match intent {
//!             CounterIntent::Increment => {
//!                 ctx.update_state(|n| n + 1).await?;
//!                 if ctx.delicate_state() == 10 {
//!                     ctx.action(CounterAction::LimitReached).await?;
//!                 }
//!             }
//!             CounterIntent::Reset => ctx.update_state(|_| 0).await?,
//!         }
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let handle = store.start(&CancellationToken::new())?;
//! let mut subscription = store.subscribe()?;
//!
//! store.send(CounterIntent::Increment).await?;
//! let latest = subscription.next_state().await;
//!
//! store.close_and_wait().await;
//! ```

// Core modules
mod channel;
mod compose;
mod config;
mod context;
mod core;
mod decorator;
mod error;
mod guard;
mod plugin;
mod queue;
mod store;
mod subscription;

// Stock plugins and decorators
pub mod decorators;
pub mod plugins;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Scenario tests (test-only)
#[cfg(test)]
mod store_tests;

// Re-export core types
pub use crate::core::{ChainId, MviAction, MviIntent, MviState, StateTransition, StopReason};

// Re-export error types
pub use crate::error::{is_contract_violation, ErrorKind, StoreError};

// Re-export configuration
pub use crate::config::{
    ActionShareBehavior, BufferOverflow, StateStrategy, StoreConfiguration,
    DEFAULT_ACTION_BUFFER, DEFAULT_INTENT_CAPACITY,
};

// Re-export plugin and decorator types
pub use crate::compose::compose;
pub use crate::decorator::{decorate, DecoratorBuilder, DecoratorHook, PluginDecorator, Proceed};
pub use crate::plugin::{AsyncHook, PluginBuilder, StorePlugin, SyncHook};

// Re-export store types (primary entry point)
pub use crate::channel::ActionReceiver;
pub use crate::context::PipelineContext;
pub use crate::guard::StateGuard;
pub use crate::store::{Reducer, Store, StoreBuilder, StoreHandle, Subscription, SubscriptionHandle};
pub use crate::subscription::{while_subscribed, SubscriberCount};

// Re-export stock plugins and decorators
pub use crate::decorators::{intent_timeout_decorator, retry_intents_decorator, timing_decorator};
pub use crate::plugins::{
    deinit_plugin, init_plugin, logging_plugin, recover_plugin, undelivered_handling_plugin,
    while_subscribed_plugin, TimeTravel, UndoRedo,
};

// Re-export commonly used external types
pub use tokio_util::sync::CancellationToken;
