//! Plugins: named bundles of optional lifecycle hooks.
//!
//! A plugin is a plain record of optional closures, one per lifecycle event.
//! There is no trait hierarchy to implement; hooks a plugin leaves out simply
//! pass the event through unchanged.
//!
//! # Hooks
//!
//! | Hook                    | Input            | Output                      | Kind           |
//! |-------------------------|------------------|-----------------------------|----------------|
//! | `on_start`              | -                | `Result<()>`                | side effect    |
//! | `on_intent`             | intent           | `Result<Option<I>>`         | value          |
//! | `on_state`              | old, new         | `Result<Option<S>>`         | value          |
//! | `on_action`             | action           | `Result<Option<A>>`         | value          |
//! | `on_exception`          | error            | `Option<anyhow::Error>`     | value          |
//! | `on_subscribe`          | subscriber count | `Result<()>`                | side effect    |
//! | `on_unsubscribe`        | subscriber count | `Result<()>`                | side effect    |
//! | `on_stop`               | stop reason      | -                           | teardown       |
//! | `on_undelivered_intent` | intent           | -                           | accounting     |
//! | `on_undelivered_action` | action           | -                           | accounting     |
//!
//! Returning `None` from a value hook absorbs the event: the intent is
//! ignored, the state change discarded, the action swallowed, or the
//! exception marked as handled.
//!
//! # Example
//!
//! ```ignore
//! let analytics = StorePlugin::builder()
//!     .name("analytics")
//!     .on_intent(|_ctx, intent: CounterIntent| async move {
//!         tracing::info!(?intent, "intent received");
//!         Ok(Some(intent))
//!     })
//!     .on_stop(|reason| tracing::info!(%reason, "store stopped"))
//!     .build();
//! ```

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::error;

use crate::context::PipelineContext;
use crate::core::{MviAction, MviIntent, MviState, StateTransition, StopReason};
use crate::error::panic_message;

/// An async hook taking the execution context and one input value.
pub type AsyncHook<S, I, A, T, R> =
    Arc<dyn Fn(PipelineContext<S, I, A>, T) -> BoxFuture<'static, R> + Send + Sync>;

/// A synchronous hook used for teardown and accounting.
pub type SyncHook<T> = Arc<dyn Fn(T) + Send + Sync>;

pub type StartHook<S, I, A> = AsyncHook<S, I, A, (), Result<()>>;
pub type IntentHook<S, I, A> = AsyncHook<S, I, A, I, Result<Option<I>>>;
pub type StateHook<S, I, A> = AsyncHook<S, I, A, StateTransition<S>, Result<Option<S>>>;
pub type ActionHook<S, I, A> = AsyncHook<S, I, A, A, Result<Option<A>>>;
pub type ExceptionHook<S, I, A> = AsyncHook<S, I, A, anyhow::Error, Option<anyhow::Error>>;
pub type SubscriptionHook<S, I, A> = AsyncHook<S, I, A, usize, Result<()>>;

/// A named bundle of optional lifecycle hooks.
pub struct StorePlugin<S, I, A> {
    pub(crate) name: Option<String>,
    pub(crate) on_start: Option<StartHook<S, I, A>>,
    pub(crate) on_intent: Option<IntentHook<S, I, A>>,
    pub(crate) on_state: Option<StateHook<S, I, A>>,
    pub(crate) on_action: Option<ActionHook<S, I, A>>,
    pub(crate) on_exception: Option<ExceptionHook<S, I, A>>,
    pub(crate) on_subscribe: Option<SubscriptionHook<S, I, A>>,
    pub(crate) on_unsubscribe: Option<SubscriptionHook<S, I, A>>,
    pub(crate) on_stop: Option<SyncHook<StopReason>>,
    pub(crate) on_undelivered_intent: Option<SyncHook<I>>,
    pub(crate) on_undelivered_action: Option<SyncHook<A>>,
}

impl<S, I, A> Clone for StorePlugin<S, I, A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            on_start: self.on_start.clone(),
            on_intent: self.on_intent.clone(),
            on_state: self.on_state.clone(),
            on_action: self.on_action.clone(),
            on_exception: self.on_exception.clone(),
            on_subscribe: self.on_subscribe.clone(),
            on_unsubscribe: self.on_unsubscribe.clone(),
            on_stop: self.on_stop.clone(),
            on_undelivered_intent: self.on_undelivered_intent.clone(),
            on_undelivered_action: self.on_undelivered_action.clone(),
        }
    }
}

impl<S, I, A> Default for StorePlugin<S, I, A> {
    fn default() -> Self {
        Self {
            name: None,
            on_start: None,
            on_intent: None,
            on_state: None,
            on_action: None,
            on_exception: None,
            on_subscribe: None,
            on_unsubscribe: None,
            on_stop: None,
            on_undelivered_intent: None,
            on_undelivered_action: None,
        }
    }
}

impl<S, I, A> std::fmt::Debug for StorePlugin<S, I, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePlugin")
            .field("name", &self.name)
            .field("on_start", &self.on_start.is_some())
            .field("on_intent", &self.on_intent.is_some())
            .field("on_state", &self.on_state.is_some())
            .field("on_action", &self.on_action.is_some())
            .field("on_exception", &self.on_exception.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: MviState, I: MviIntent, A: MviAction> StorePlugin<S, I, A> {
    /// Start building a plugin.
    pub fn builder() -> PluginBuilder<S, I, A> {
        PluginBuilder {
            plugin: StorePlugin::default(),
        }
    }

    /// The plugin name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Rename the plugin, e.g. to install two stock plugins side by side.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    // Invocation helpers. A missing hook passes its input through.

    pub(crate) async fn start(&self, ctx: PipelineContext<S, I, A>) -> Result<()> {
        match &self.on_start {
            Some(hook) => hook(ctx, ()).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn intent(&self, ctx: PipelineContext<S, I, A>, intent: I) -> Result<Option<I>> {
        match &self.on_intent {
            Some(hook) => hook(ctx, intent).await,
            None => Ok(Some(intent)),
        }
    }

    pub(crate) async fn state(
        &self,
        ctx: PipelineContext<S, I, A>,
        transition: StateTransition<S>,
    ) -> Result<Option<S>> {
        match &self.on_state {
            Some(hook) => hook(ctx, transition).await,
            None => Ok(Some(transition.new)),
        }
    }

    pub(crate) async fn action(&self, ctx: PipelineContext<S, I, A>, action: A) -> Result<Option<A>> {
        match &self.on_action {
            Some(hook) => hook(ctx, action).await,
            None => Ok(Some(action)),
        }
    }

    pub(crate) async fn exception(
        &self,
        ctx: PipelineContext<S, I, A>,
        error: anyhow::Error,
    ) -> Option<anyhow::Error> {
        match &self.on_exception {
            Some(hook) => hook(ctx, error).await,
            None => Some(error),
        }
    }

    pub(crate) async fn subscribe(&self, ctx: PipelineContext<S, I, A>, count: usize) -> Result<()> {
        match &self.on_subscribe {
            Some(hook) => hook(ctx, count).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn unsubscribe(&self, ctx: PipelineContext<S, I, A>, count: usize) -> Result<()> {
        match &self.on_unsubscribe {
            Some(hook) => hook(ctx, count).await,
            None => Ok(()),
        }
    }

    pub(crate) fn stop(&self, reason: StopReason) {
        if let Some(hook) = &self.on_stop {
            self.isolate("on_stop", || hook(reason));
        }
    }

    pub(crate) fn undelivered_intent(&self, intent: I) {
        if let Some(hook) = &self.on_undelivered_intent {
            self.isolate("on_undelivered_intent", || hook(intent));
        }
    }

    pub(crate) fn undelivered_action(&self, action: A) {
        if let Some(hook) = &self.on_undelivered_action {
            self.isolate("on_undelivered_action", || hook(action));
        }
    }

    /// Sync hooks run during teardown, so a panic must not unwind past them.
    fn isolate(&self, hook: &'static str, f: impl FnOnce()) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
            error!(
                plugin = self.name.as_deref().unwrap_or("composed"),
                hook,
                panic = %panic_message(payload.as_ref()),
                "sync hook panicked"
            );
        }
    }
}

/// Fluent builder for [`StorePlugin`].
///
/// Each `on_*` method replaces the hook of the same name.
pub struct PluginBuilder<S, I, A> {
    plugin: StorePlugin<S, I, A>,
}

impl<S: MviState, I: MviIntent, A: MviAction> PluginBuilder<S, I, A> {
    /// Name the plugin. Names must be unique within a store.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.plugin.name = Some(name.into());
        self
    }

    /// Called once when the store starts.
    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.plugin.on_start = Some(Arc::new(move |ctx, ()| f(ctx).boxed()));
        self
    }

    /// Called for every intent before it reaches the reducer.
    pub fn on_intent<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<I>>> + Send + 'static,
    {
        self.plugin.on_intent = Some(Arc::new(move |ctx, intent| f(ctx, intent).boxed()));
        self
    }

    /// Called with `(old, new)` before a new state is published.
    pub fn on_state<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, S, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<S>>> + Send + 'static,
    {
        self.plugin.on_state = Some(Arc::new(move |ctx, t: StateTransition<S>| {
            f(ctx, t.old, t.new).boxed()
        }));
        self
    }

    /// Called for every action before it is delivered.
    pub fn on_action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<A>>> + Send + 'static,
    {
        self.plugin.on_action = Some(Arc::new(move |ctx, action| f(ctx, action).boxed()));
        self
    }

    /// Called for every exception. Return `None` once handled.
    pub fn on_exception<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, anyhow::Error) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<anyhow::Error>> + Send + 'static,
    {
        self.plugin.on_exception = Some(Arc::new(move |ctx, error| f(ctx, error).boxed()));
        self
    }

    /// Called after a subscriber attaches, with the new count.
    pub fn on_subscribe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.plugin.on_subscribe = Some(Arc::new(move |ctx, count| f(ctx, count).boxed()));
        self
    }

    /// Called after a subscriber detaches, with the new count.
    pub fn on_unsubscribe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.plugin.on_unsubscribe = Some(Arc::new(move |ctx, count| f(ctx, count).boxed()));
        self
    }

    /// Called exactly once when the store stops.
    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: Fn(&StopReason) + Send + Sync + 'static,
    {
        self.plugin.on_stop = Some(Arc::new(move |reason: StopReason| f(&reason)));
        self
    }

    /// Called for every intent that was queued but never processed.
    pub fn on_undelivered_intent<F>(mut self, f: F) -> Self
    where
        F: Fn(I) + Send + Sync + 'static,
    {
        self.plugin.on_undelivered_intent = Some(Arc::new(f));
        self
    }

    /// Called for every action that was emitted but never delivered.
    pub fn on_undelivered_action<F>(mut self, f: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        self.plugin.on_undelivered_action = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> StorePlugin<S, I, A> {
        self.plugin
    }
}
