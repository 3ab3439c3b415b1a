//! Decorators: onion-style wrappers around an already-built plugin.
//!
//! A decorator hook receives the context, a [`Proceed`] continuation and the
//! input value. Calling `proceed.proceed(value)` runs the wrapped (inner)
//! hook and returns its result; not calling it short-circuits.
//!
//! ```text
//! outer.before ─► inner.before ─► plugin hook ─► inner.after ─► outer.after
//! ```
//!
//! # Verification
//!
//! With verification on (see [`StoreConfiguration::effective_verification`]),
//! every wrapped call is checked after the decorator returns: a decorator
//! that called `proceed` anything other than exactly once fails with
//! [`StoreError::ProceedContractViolated`]. Decorators that intentionally
//! skip or repeat the continuation opt out with
//! [`DecoratorBuilder::skip_verification`].
//!
//! Only the async hooks are wrapped. `on_stop` and the undelivered hooks pass
//! through unchanged.
//!
//! [`StoreConfiguration::effective_verification`]: crate::StoreConfiguration::effective_verification

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::PipelineContext;
use crate::core::{MviAction, MviIntent, MviState, StateTransition};
use crate::error::StoreError;
use crate::plugin::{AsyncHook, StorePlugin};

type Next<T, R> = Arc<dyn Fn(T) -> BoxFuture<'static, R> + Send + Sync>;

/// Continuation handed to a decorator hook.
pub struct Proceed<T, R> {
    next: Next<T, R>,
    calls: Arc<AtomicUsize>,
}

impl<T, R> Clone for Proceed<T, R> {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
            calls: self.calls.clone(),
        }
    }
}

impl<T, R> Proceed<T, R> {
    /// Invoke the wrapped hook.
    pub fn proceed(&self, value: T) -> BoxFuture<'static, R> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.next)(value)
    }

    /// How many times `proceed` has been called so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T, R> std::fmt::Debug for Proceed<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proceed")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

/// A decorator hook: `(ctx, proceed, value) -> result`.
pub type DecoratorHook<S, I, A, T, R> = Arc<
    dyn Fn(PipelineContext<S, I, A>, Proceed<T, R>, T) -> BoxFuture<'static, R> + Send + Sync,
>;

/// A named set of optional hook wrappers.
pub struct PluginDecorator<S, I, A> {
    pub(crate) name: String,
    pub(crate) verify: bool,
    on_start: Option<DecoratorHook<S, I, A, (), Result<()>>>,
    on_intent: Option<DecoratorHook<S, I, A, I, Result<Option<I>>>>,
    on_state: Option<DecoratorHook<S, I, A, StateTransition<S>, Result<Option<S>>>>,
    on_action: Option<DecoratorHook<S, I, A, A, Result<Option<A>>>>,
    on_exception: Option<DecoratorHook<S, I, A, anyhow::Error, Option<anyhow::Error>>>,
    on_subscribe: Option<DecoratorHook<S, I, A, usize, Result<()>>>,
    on_unsubscribe: Option<DecoratorHook<S, I, A, usize, Result<()>>>,
}

impl<S, I, A> Clone for PluginDecorator<S, I, A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            verify: self.verify,
            on_start: self.on_start.clone(),
            on_intent: self.on_intent.clone(),
            on_state: self.on_state.clone(),
            on_action: self.on_action.clone(),
            on_exception: self.on_exception.clone(),
            on_subscribe: self.on_subscribe.clone(),
            on_unsubscribe: self.on_unsubscribe.clone(),
        }
    }
}

impl<S, I, A> std::fmt::Debug for PluginDecorator<S, I, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDecorator")
            .field("name", &self.name)
            .field("verify", &self.verify)
            .finish_non_exhaustive()
    }
}

impl<S: MviState, I: MviIntent, A: MviAction> PluginDecorator<S, I, A> {
    pub fn builder(name: impl Into<String>) -> DecoratorBuilder<S, I, A> {
        DecoratorBuilder {
            decorator: PluginDecorator {
                name: name.into(),
                verify: true,
                on_start: None,
                on_intent: None,
                on_state: None,
                on_action: None,
                on_exception: None,
                on_subscribe: None,
                on_unsubscribe: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct DecoratorBuilder<S, I, A> {
    decorator: PluginDecorator<S, I, A>,
}

impl<S: MviState, I: MviIntent, A: MviAction> DecoratorBuilder<S, I, A> {
    /// Exempt this decorator from the proceed-exactly-once check.
    pub fn skip_verification(mut self) -> Self {
        self.decorator.verify = false;
        self
    }

    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, Proceed<(), Result<()>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.decorator.on_start = Some(Arc::new(move |ctx, proceed, ()| f(ctx, proceed).boxed()));
        self
    }

    pub fn on_intent<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, Proceed<I, Result<Option<I>>>, I) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<Option<I>>> + Send + 'static,
    {
        self.decorator.on_intent = Some(Arc::new(move |ctx, proceed, intent| {
            f(ctx, proceed, intent).boxed()
        }));
        self
    }

    pub fn on_state<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, Proceed<StateTransition<S>, Result<Option<S>>>, StateTransition<S>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<Option<S>>> + Send + 'static,
    {
        self.decorator.on_state = Some(Arc::new(move |ctx, proceed, transition| {
            f(ctx, proceed, transition).boxed()
        }));
        self
    }

    pub fn on_action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, Proceed<A, Result<Option<A>>>, A) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<Option<A>>> + Send + 'static,
    {
        self.decorator.on_action = Some(Arc::new(move |ctx, proceed, action| {
            f(ctx, proceed, action).boxed()
        }));
        self
    }

    pub fn on_exception<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, Proceed<anyhow::Error, Option<anyhow::Error>>, anyhow::Error) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Option<anyhow::Error>> + Send + 'static,
    {
        self.decorator.on_exception = Some(Arc::new(move |ctx, proceed, error| {
            f(ctx, proceed, error).boxed()
        }));
        self
    }

    pub fn on_subscribe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, Proceed<usize, Result<()>>, usize) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.decorator.on_subscribe = Some(Arc::new(move |ctx, proceed, count| {
            f(ctx, proceed, count).boxed()
        }));
        self
    }

    pub fn on_unsubscribe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, Proceed<usize, Result<()>>, usize) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.decorator.on_unsubscribe = Some(Arc::new(move |ctx, proceed, count| {
            f(ctx, proceed, count).boxed()
        }));
        self
    }

    pub fn build(self) -> PluginDecorator<S, I, A> {
        self.decorator
    }
}

// =============================================================================
// Wrapping
// =============================================================================

/// Wrap `plugin` with `decorators`. The first decorator is the outermost
/// layer.
pub fn decorate<S, I, A>(
    plugin: StorePlugin<S, I, A>,
    decorators: &[PluginDecorator<S, I, A>],
    verify: bool,
) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    decorators
        .iter()
        .rev()
        .fold(plugin, |inner, decorator| apply(inner, decorator, verify))
}

fn apply<S, I, A>(
    plugin: StorePlugin<S, I, A>,
    decorator: &PluginDecorator<S, I, A>,
    verify: bool,
) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    let layer = Layer {
        decorator: Arc::from(decorator.name.as_str()),
        verify: verify && decorator.verify,
    };

    StorePlugin {
        on_start: layer.wrap("on_start", plugin.on_start, decorator.on_start.clone(), |()| Ok(()), Err),
        on_intent: layer.wrap(
            "on_intent",
            plugin.on_intent,
            decorator.on_intent.clone(),
            |intent| Ok(Some(intent)),
            Err,
        ),
        on_state: layer.wrap(
            "on_state",
            plugin.on_state,
            decorator.on_state.clone(),
            |transition: StateTransition<S>| Ok(Some(transition.new)),
            Err,
        ),
        on_action: layer.wrap(
            "on_action",
            plugin.on_action,
            decorator.on_action.clone(),
            |action| Ok(Some(action)),
            Err,
        ),
        on_exception: layer.wrap(
            "on_exception",
            plugin.on_exception,
            decorator.on_exception.clone(),
            Some,
            Some,
        ),
        on_subscribe: layer.wrap(
            "on_subscribe",
            plugin.on_subscribe,
            decorator.on_subscribe.clone(),
            |_| Ok(()),
            Err,
        ),
        on_unsubscribe: layer.wrap(
            "on_unsubscribe",
            plugin.on_unsubscribe,
            decorator.on_unsubscribe.clone(),
            |_| Ok(()),
            Err,
        ),
        ..plugin
    }
}

struct Layer {
    decorator: Arc<str>,
    verify: bool,
}

impl Layer {
    /// Wrap one hook. `passthrough` stands in for a missing inner hook and
    /// `violation` turns a contract error into the hook's result type.
    fn wrap<S, I, A, T, R>(
        &self,
        hook: &'static str,
        inner: Option<AsyncHook<S, I, A, T, R>>,
        outer: Option<DecoratorHook<S, I, A, T, R>>,
        passthrough: fn(T) -> R,
        violation: fn(anyhow::Error) -> R,
    ) -> Option<AsyncHook<S, I, A, T, R>>
    where
        S: MviState,
        I: MviIntent,
        A: MviAction,
        T: Send + 'static,
        R: Send + 'static,
    {
        let Some(outer) = outer else { return inner };
        let decorator = self.decorator.clone();
        let verify = self.verify;

        Some(Arc::new(move |ctx: PipelineContext<S, I, A>, value: T| {
            let next: Next<T, R> = match &inner {
                Some(inner) => {
                    let inner = inner.clone();
                    let ctx = ctx.clone();
                    Arc::new(move |v: T| inner(ctx.clone(), v))
                }
                None => Arc::new(move |v: T| futures::future::ready(passthrough(v)).boxed()),
            };
            let calls = Arc::new(AtomicUsize::new(0));
            let proceed = Proceed {
                next,
                calls: calls.clone(),
            };
            let wrapped = outer(ctx, proceed, value);
            let decorator = decorator.clone();

            async move {
                let result = wrapped.await;
                let calls = calls.load(Ordering::SeqCst);
                if verify && calls != 1 {
                    return violation(
                        StoreError::ProceedContractViolated {
                            decorator: decorator.to_string(),
                            hook,
                            calls,
                        }
                        .into(),
                    );
                }
                result
            }
            .boxed()
        }))
    }
}
