use std::time::Instant;

use tracing::debug;

use crate::core::{MviAction, MviIntent, MviState};
use crate::decorator::PluginDecorator;

/// Measure the intent, state and action hooks and log how long they took.
pub fn timing_decorator<S, I, A>(tag: impl Into<String>) -> PluginDecorator<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    let tag: String = tag.into();
    let (on_intent, on_state, on_action) = (tag.clone(), tag.clone(), tag.clone());

    PluginDecorator::builder(format!("timing:{tag}"))
        .on_intent(move |_, proceed, intent| {
            let tag = on_intent.clone();
            async move {
                let started = Instant::now();
                let out = proceed.proceed(intent).await;
                debug!(
                    %tag,
                    hook = "on_intent",
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "hook timing"
                );
                out
            }
        })
        .on_state(move |_, proceed, transition| {
            let tag = on_state.clone();
            async move {
                let started = Instant::now();
                let out = proceed.proceed(transition).await;
                debug!(
                    %tag,
                    hook = "on_state",
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "hook timing"
                );
                out
            }
        })
        .on_action(move |_, proceed, action| {
            let tag = on_action.clone();
            async move {
                let started = Instant::now();
                let out = proceed.proceed(action).await;
                debug!(
                    %tag,
                    hook = "on_action",
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "hook timing"
                );
                out
            }
        })
        .build()
}
