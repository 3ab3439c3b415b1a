//! Single-purpose plugins for the common lifecycle hooks.

use std::future::Future;

use crate::context::PipelineContext;
use crate::core::{MviAction, MviIntent, MviState, StopReason};
use crate::plugin::StorePlugin;

/// Run `f` once when the store starts.
pub fn init_plugin<S, I, A, F, Fut>(f: F) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
    F: Fn(PipelineContext<S, I, A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    StorePlugin::builder().name("init").on_start(f).build()
}

/// Run `f` once when the store stops.
pub fn deinit_plugin<S, I, A, F>(f: F) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
    F: Fn(&StopReason) + Send + Sync + 'static,
{
    StorePlugin::builder().name("deinit").on_stop(f).build()
}

/// Handle exceptions. Return `None` to mark one as handled, or pass it (or
/// a replacement) on.
pub fn recover_plugin<S, I, A, F, Fut>(f: F) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
    F: Fn(PipelineContext<S, I, A>, anyhow::Error) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<anyhow::Error>> + Send + 'static,
{
    StorePlugin::builder().name("recover").on_exception(f).build()
}

/// Observe intents and actions that were accepted but never delivered.
pub fn undelivered_handling_plugin<S, I, A, FI, FA>(on_intent: FI, on_action: FA) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
    FI: Fn(I) + Send + Sync + 'static,
    FA: Fn(A) + Send + Sync + 'static,
{
    StorePlugin::builder()
        .name("undelivered")
        .on_undelivered_intent(on_intent)
        .on_undelivered_action(on_action)
        .build()
}
