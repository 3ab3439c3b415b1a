//! Folding an ordered plugin list into one effective plugin.
//!
//! # Guarantees
//!
//! - Value hooks (`on_intent`, `on_state`, `on_action`, `on_exception`) run
//!   in installation order, each receiving the previous output. The first
//!   `None` stops the chain.
//! - Side-effect hooks (`on_start`, `on_subscribe`, `on_unsubscribe`) run on
//!   every plugin in installation order. The first error is returned and the
//!   rest are logged.
//! - `on_stop` runs on every plugin in reverse installation order. A panicking
//!   stop handler does not prevent the others from running.
//! - Undelivered hooks run on every plugin in installation order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, warn};

use crate::context::PipelineContext;
use crate::core::{MviAction, MviIntent, MviState, StateTransition, StopReason};
use crate::error::panic_message;
use crate::plugin::{AsyncHook, StorePlugin, SubscriptionHook, SyncHook};

/// Compose plugins into one, preserving installation order.
pub fn compose<S, I, A>(plugins: Vec<StorePlugin<S, I, A>>) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    if plugins.len() == 1 {
        if let Some(only) = plugins.into_iter().next() {
            return only;
        }
        return StorePlugin::default();
    }

    let names: Arc<[String]> = plugins
        .iter()
        .enumerate()
        .map(|(i, p)| p.name.clone().unwrap_or_else(|| format!("plugin#{i}")))
        .collect();

    StorePlugin {
        name: None,
        on_start: compose_start(&plugins, names.clone()),
        on_intent: chain_values(plugins.iter().filter_map(|p| p.on_intent.clone()).collect()),
        on_state: chain_states(plugins.iter().filter_map(|p| p.on_state.clone()).collect()),
        on_action: chain_values(plugins.iter().filter_map(|p| p.on_action.clone()).collect()),
        on_exception: chain_exceptions(
            plugins.iter().filter_map(|p| p.on_exception.clone()).collect(),
        ),
        on_subscribe: compose_counts(
            "on_subscribe",
            plugins.iter().map(|p| p.on_subscribe.clone()).collect(),
            names.clone(),
        ),
        on_unsubscribe: compose_counts(
            "on_unsubscribe",
            plugins.iter().map(|p| p.on_unsubscribe.clone()).collect(),
            names.clone(),
        ),
        on_stop: compose_stop(&plugins),
        on_undelivered_intent: fan_out(
            "on_undelivered_intent",
            named(&plugins, &names, |p| p.on_undelivered_intent.clone()),
        ),
        on_undelivered_action: fan_out(
            "on_undelivered_action",
            named(&plugins, &names, |p| p.on_undelivered_action.clone()),
        ),
    }
}

// =============================================================================
// Value chains
// =============================================================================

type ValueHook<S, I, A, T> = AsyncHook<S, I, A, T, anyhow::Result<Option<T>>>;

fn chain_values<S, I, A, T>(hooks: Vec<ValueHook<S, I, A, T>>) -> Option<ValueHook<S, I, A, T>>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
    T: Send + 'static,
{
    if hooks.len() <= 1 {
        return hooks.into_iter().next();
    }
    let hooks: Arc<[ValueHook<S, I, A, T>]> = hooks.into();
    Some(Arc::new(move |ctx: PipelineContext<S, I, A>, value: T| {
        let hooks = hooks.clone();
        async move {
            let mut current = value;
            for hook in hooks.iter() {
                match hook(ctx.clone(), current).await {
                    Ok(Some(next)) => current = next,
                    Ok(None) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
            Ok(Some(current))
        }
        .boxed()
    }))
}

type StateChainHook<S, I, A> = AsyncHook<S, I, A, StateTransition<S>, anyhow::Result<Option<S>>>;

fn chain_states<S, I, A>(hooks: Vec<StateChainHook<S, I, A>>) -> Option<StateChainHook<S, I, A>>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    if hooks.len() <= 1 {
        return hooks.into_iter().next();
    }
    let hooks: Arc<[StateChainHook<S, I, A>]> = hooks.into();
    Some(Arc::new(move |ctx: PipelineContext<S, I, A>, transition: StateTransition<S>| {
        let hooks = hooks.clone();
        async move {
            let StateTransition { old, new } = transition;
            let mut current = new;
            for hook in hooks.iter() {
                let step = StateTransition::new(old.clone(), current);
                match hook(ctx.clone(), step).await {
                    Ok(Some(next)) => current = next,
                    Ok(None) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
            Ok(Some(current))
        }
        .boxed()
    }))
}

type ExceptionChainHook<S, I, A> = AsyncHook<S, I, A, anyhow::Error, Option<anyhow::Error>>;

fn chain_exceptions<S, I, A>(
    hooks: Vec<ExceptionChainHook<S, I, A>>,
) -> Option<ExceptionChainHook<S, I, A>>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    if hooks.len() <= 1 {
        return hooks.into_iter().next();
    }
    let hooks: Arc<[ExceptionChainHook<S, I, A>]> = hooks.into();
    Some(Arc::new(move |ctx: PipelineContext<S, I, A>, error: anyhow::Error| {
        let hooks = hooks.clone();
        async move {
            let mut current = error;
            for hook in hooks.iter() {
                match hook(ctx.clone(), current).await {
                    Some(next) => current = next,
                    None => return None,
                }
            }
            Some(current)
        }
        .boxed()
    }))
}

// =============================================================================
// Side-effect hooks
// =============================================================================

fn compose_start<S, I, A>(
    plugins: &[StorePlugin<S, I, A>],
    names: Arc<[String]>,
) -> Option<AsyncHook<S, I, A, (), anyhow::Result<()>>>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    let hooks: Vec<_> = plugins.iter().map(|p| p.on_start.clone()).collect();
    if hooks.iter().all(Option::is_none) {
        return None;
    }
    let hooks: Arc<[_]> = hooks.into();
    Some(Arc::new(move |ctx: PipelineContext<S, I, A>, ()| {
        let hooks = hooks.clone();
        let names = names.clone();
        async move {
            let mut first: Option<anyhow::Error> = None;
            for (i, hook) in hooks.iter().enumerate() {
                let Some(hook) = hook else { continue };
                if let Err(e) = hook(ctx.clone(), ()).await {
                    keep_first(&mut first, e, &names[i], "on_start");
                }
            }
            first.map_or(Ok(()), Err)
        }
        .boxed()
    }))
}

fn compose_counts<S, I, A>(
    hook_name: &'static str,
    hooks: Vec<Option<SubscriptionHook<S, I, A>>>,
    names: Arc<[String]>,
) -> Option<SubscriptionHook<S, I, A>>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    if hooks.iter().all(Option::is_none) {
        return None;
    }
    let hooks: Arc<[_]> = hooks.into();
    Some(Arc::new(move |ctx: PipelineContext<S, I, A>, count: usize| {
        let hooks = hooks.clone();
        let names = names.clone();
        async move {
            let mut first: Option<anyhow::Error> = None;
            for (i, hook) in hooks.iter().enumerate() {
                let Some(hook) = hook else { continue };
                if let Err(e) = hook(ctx.clone(), count).await {
                    keep_first(&mut first, e, &names[i], hook_name);
                }
            }
            first.map_or(Ok(()), Err)
        }
        .boxed()
    }))
}

fn keep_first(first: &mut Option<anyhow::Error>, e: anyhow::Error, plugin: &str, hook: &str) {
    if first.is_none() {
        *first = Some(e);
    } else {
        warn!(plugin, hook, error = %e, "additional lifecycle hook failure");
    }
}

fn compose_stop<S, I, A>(plugins: &[StorePlugin<S, I, A>]) -> Option<SyncHook<StopReason>> {
    let hooks: Vec<(String, SyncHook<StopReason>)> = plugins
        .iter()
        .enumerate()
        .rev()
        .filter_map(|(i, p)| {
            let hook = p.on_stop.clone()?;
            let name = p.name.clone().unwrap_or_else(|| format!("plugin#{i}"));
            Some((name, hook))
        })
        .collect();
    if hooks.is_empty() {
        return None;
    }
    Some(Arc::new(move |reason: StopReason| {
        for (name, hook) in &hooks {
            let reason = reason.clone();
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(reason))) {
                error!(
                    plugin = %name,
                    panic = %panic_message(payload.as_ref()),
                    "stop hook panicked"
                );
            }
        }
    }))
}

fn named<S, I, A, T>(
    plugins: &[StorePlugin<S, I, A>],
    names: &[String],
    hook: impl Fn(&StorePlugin<S, I, A>) -> Option<SyncHook<T>>,
) -> Vec<(String, SyncHook<T>)> {
    plugins
        .iter()
        .zip(names.iter())
        .filter_map(|(p, name)| Some((name.clone(), hook(p)?)))
        .collect()
}

/// Every hook sees every item. A panicking hook is logged and skipped.
fn fan_out<T: Clone + Send + 'static>(
    hook_name: &'static str,
    hooks: Vec<(String, SyncHook<T>)>,
) -> Option<SyncHook<T>> {
    if hooks.is_empty() {
        return None;
    }
    Some(Arc::new(move |item: T| {
        for (name, hook) in &hooks {
            let item = item.clone();
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(item))) {
                error!(
                    plugin = %name,
                    hook = hook_name,
                    panic = %panic_message(payload.as_ref()),
                    "undelivered hook panicked"
                );
            }
        }
    }))
}
