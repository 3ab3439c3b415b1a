//! Execution context handed to reducers, plugins and decorators.
//!
//! A `PipelineContext` is a cheap handle onto the running store. Besides the
//! state and action operations it carries the [`ChainId`] of the state
//! transaction it runs under (if any), which is how nested transactions on
//! the same chain are recognised.
//!
//! # Example
//!
//! ```ignore
//! Store::builder(Counter::default())
//!     .reduce(|ctx, intent: CounterIntent| async move {
//!         match intent {
//!             CounterIntent::Increment => ctx.update_state(|s| s.incremented()).await?,
//!             CounterIntent::Reset => {
//!                 ctx.with_state(|ctx, current| async move {
//!                     if current.count > 0 {
//!                         ctx.action(CounterAction::WasReset(current.count)).await?;
//!                     }
//!                     // Same chain, so this does not wait on the outer transaction
//!                     ctx.update_state(|_| Counter::default()).await
//!                 })
//!                 .await?
//!             }
//!         }
//!         Ok(())
//!     })
//!     .build()?;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::StoreConfiguration;
use crate::core::{ChainId, MviAction, MviIntent, MviState, StateTransition};
use crate::error::{panic_error, StoreError};
use crate::store::StoreInner;

/// Handle onto a store, passed to every handler.
pub struct PipelineContext<S, I, A> {
    pub(crate) inner: Arc<StoreInner<S, I, A>>,
    chain: Option<ChainId>,
}

impl<S, I, A> Clone for PipelineContext<S, I, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            chain: self.chain,
        }
    }
}

impl<S, I, A> std::fmt::Debug for PipelineContext<S, I, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("store", &self.inner.name)
            .field("chain", &self.chain)
            .finish()
    }
}

impl<S: MviState, I: MviIntent, A: MviAction> PipelineContext<S, I, A> {
    pub(crate) fn new(inner: Arc<StoreInner<S, I, A>>, chain: Option<ChainId>) -> Self {
        Self { inner, chain }
    }

    /// The transaction chain this context runs under, if any.
    pub fn chain(&self) -> Option<ChainId> {
        self.chain
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Replace the state with `f(current)` inside a guarded transaction.
    ///
    /// The result passes through the state hooks before it is published. A
    /// hook returning `None` discards the change.
    pub async fn update_state<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(S) -> S + Send,
    {
        let inner = self.inner.clone();
        self.inner
            .guard
            .transaction(self.chain, move |chain| async move {
                let ctx = PipelineContext::new(inner, chain);
                let old = ctx.inner.current();
                let new = f(old.clone());
                ctx.publish(old, new).await
            })
            .await?
    }

    /// Run `f` inside a guarded transaction with the current state.
    ///
    /// The context passed to `f` carries the transaction chain, so
    /// `update_state` and `with_state` calls made through it nest instead of
    /// waiting.
    pub async fn with_state<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(PipelineContext<S, I, A>, S) -> Fut + Send,
        Fut: Future<Output = Result<R>> + Send,
    {
        let inner = self.inner.clone();
        self.inner
            .guard
            .transaction(self.chain, move |chain| async move {
                let ctx = PipelineContext::new(inner, chain);
                let current = ctx.inner.current();
                f(ctx, current).await
            })
            .await?
    }

    /// Replace the state without taking the guard.
    ///
    /// This can overwrite a concurrent transaction. It exists for hard resets
    /// and similar overrides; state hooks still run.
    pub async fn update_state_immediate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(S) -> S + Send,
    {
        let old = self.inner.current();
        let new = f(old.clone());
        self.publish(old, new).await
    }

    /// Read the state through the guard.
    pub async fn state(&self) -> Result<S, StoreError> {
        let inner = &self.inner;
        inner
            .guard
            .transaction(self.chain, |_| async move { inner.current() })
            .await
    }

    /// Read the state without the guard. May observe a value that an
    /// in-flight transaction is about to replace.
    pub fn delicate_state(&self) -> S {
        self.inner.current()
    }

    async fn publish(&self, old: S, new: S) -> Result<()> {
        match self
            .inner
            .plugin
            .state(self.clone(), StateTransition::new(old, new))
            .await?
        {
            Some(next) => {
                self.inner.state.send_replace(next);
            }
            None => trace!(store = %self.inner.name, "state change discarded by plugin"),
        }
        Ok(())
    }

    // =========================================================================
    // Actions and intents
    // =========================================================================

    /// Emit an action through the action hooks and the action channel.
    ///
    /// May suspend under the suspend overflow policy until a subscriber
    /// makes room.
    pub async fn action(&self, action: A) -> Result<()> {
        let Some(action) = self.inner.plugin.action(self.clone(), action).await? else {
            trace!(store = %self.inner.name, "action absorbed by plugin");
            return Ok(());
        };
        self.inner.emit(action).await?;
        Ok(())
    }

    /// Queue an intent on this store.
    ///
    /// In sequential mode the queue is drained by the task currently running
    /// the reducer, so awaiting a full queue from inside a reducer never
    /// resolves. Prefer [`try_send`](Self::try_send) there.
    pub async fn send(&self, intent: I) -> Result<(), StoreError> {
        self.inner.send(intent).await
    }

    /// Queue an intent without waiting.
    pub fn try_send(&self, intent: I) -> Result<(), StoreError> {
        self.inner.try_send(intent)
    }

    // =========================================================================
    // Tasks and lifecycle
    // =========================================================================

    /// Spawn a child task bound to the store's lifetime.
    ///
    /// The task is cancelled when the store stops, and teardown waits for it.
    /// The context it receives carries no transaction chain. An error or panic
    /// goes through the exception hooks and stops the store if unhandled.
    pub fn spawn<F, Fut>(&self, f: F)
    where
        F: FnOnce(PipelineContext<S, I, A>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let ctx = PipelineContext::new(self.inner.clone(), None);
        let token = self.inner.token.clone();
        let task = f(ctx.clone());

        self.inner.tasks.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => return,
                outcome = AssertUnwindSafe(task).catch_unwind() => outcome,
            };
            let result = outcome.unwrap_or_else(|payload| Err(panic_error(payload)));
            if let Err(e) = result {
                ctx.inner.handle_failure(&ctx, e).await;
            }
        });
    }

    /// Token cancelled when the store stops.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Ask the store to stop. Teardown runs on the store's own task.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.get()
    }

    /// Watch the subscriber count.
    pub fn subscriber_watch(&self) -> watch::Receiver<usize> {
        self.inner.subscribers.watch()
    }

    pub fn config(&self) -> &StoreConfiguration {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateStrategy;
    use crate::store::Store;
    use std::time::Duration;

    fn store(strategy: StateStrategy) -> Store<i32, i32, i32> {
        Store::builder(0)
            .configure(StoreConfiguration::default().with_state_strategy(strategy))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_with_state_nests_without_deadlock() {
        let store = store(StateStrategy::default());
        let ctx = store.context();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            ctx.with_state(|ctx, current| async move {
                ctx.update_state(move |_| current + 5).await?;
                ctx.update_state(|s| s * 2).await?;
                Ok(ctx.state().await?)
            }),
        )
        .await
        .expect("nested transaction deadlocked");

        assert_eq!(result.unwrap(), 10);
        assert_eq!(ctx.delicate_state(), 10);
    }

    #[tokio::test]
    async fn test_non_reentrant_nesting_is_an_error() {
        let store = store(StateStrategy::Guarded { reentrant: false });
        let ctx = store.context();

        let err = ctx
            .with_state(|ctx, _| async move { ctx.update_state(|s| s + 1).await })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::RecursiveTransaction)
        ));
        assert_eq!(ctx.delicate_state(), 0);
    }

    #[tokio::test]
    async fn test_immediate_update_overrides_held_guard() {
        let store = store(StateStrategy::default());
        let ctx = store.context();
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.with_state(|_, _| async move {
                    entered_tx.send(()).unwrap();
                    release_rx.await.unwrap();
                    Ok(())
                })
                .await
            })
        };
        entered_rx.await.unwrap();

        // The guarded path waits, the immediate one does not.
        let blocked = tokio::time::timeout(Duration::from_millis(20), ctx.update_state(|_| 1)).await;
        assert!(blocked.is_err());
        ctx.update_state_immediate(|_| 42).await.unwrap();
        assert_eq!(ctx.delicate_state(), 42);

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_state_hook_can_discard() {
        let store: Store<i32, i32, i32> = Store::builder(3)
            .install(
                crate::plugin::StorePlugin::builder()
                    .on_state(|_, old, new| async move { Ok((new >= old).then_some(new)) })
                    .build(),
            )
            .build()
            .unwrap();
        let ctx = store.context();

        ctx.update_state(|s| s - 1).await.unwrap();
        assert_eq!(ctx.delicate_state(), 3, "decrease discarded");
        ctx.update_state(|s| s + 1).await.unwrap();
        assert_eq!(ctx.delicate_state(), 4);
    }
}
