use tracing::{debug, error, info, warn};

use crate::core::{MviAction, MviIntent, MviState};
use crate::plugin::StorePlugin;

/// Log every hook through `tracing`.
///
/// Flow events go to `debug`, start and stop to `info`, undelivered items to
/// `warn` and exceptions to `error`. Nothing is transformed or absorbed.
pub fn logging_plugin<S, I, A>(tag: impl Into<String>) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    let tag: String = tag.into();
    let t = tag.clone();
    let on_intent = tag.clone();
    let on_state = tag.clone();
    let on_action = tag.clone();
    let on_exception = tag.clone();
    let on_subscribe = tag.clone();
    let on_unsubscribe = tag.clone();
    let on_stop = tag.clone();
    let lost_intent = tag.clone();
    let lost_action = tag.clone();

    StorePlugin::builder()
        .name("logging")
        .on_start(move |ctx| {
            info!(tag = %t, store = %ctx.name(), "store starting");
            async { Ok(()) }
        })
        .on_intent(move |_, intent| {
            debug!(tag = %on_intent, ?intent, "intent");
            async move { Ok(Some(intent)) }
        })
        .on_state(move |_, old, new| {
            debug!(tag = %on_state, ?old, ?new, "state");
            async move { Ok(Some(new)) }
        })
        .on_action(move |_, action| {
            debug!(tag = %on_action, ?action, "action");
            async move { Ok(Some(action)) }
        })
        .on_exception(move |_, e| {
            error!(tag = %on_exception, error = %e, "exception");
            async move { Some(e) }
        })
        .on_subscribe(move |_, count| {
            debug!(tag = %on_subscribe, subscribers = count, "subscribed");
            async { Ok(()) }
        })
        .on_unsubscribe(move |_, count| {
            debug!(tag = %on_unsubscribe, subscribers = count, "unsubscribed");
            async { Ok(()) }
        })
        .on_stop(move |reason| info!(tag = %on_stop, %reason, "store stopped"))
        .on_undelivered_intent(move |intent| warn!(tag = %lost_intent, ?intent, "undelivered intent"))
        .on_undelivered_action(move |action| warn!(tag = %lost_action, ?action, "undelivered action"))
        .build()
}
