use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::context::PipelineContext;
use crate::core::{MviAction, MviIntent, MviState};
use crate::plugin::StorePlugin;
use crate::subscription::while_subscribed;

/// Run `job` inside the store while at least `min_subscribers` are attached.
///
/// The job is started as a child task of the store, cancelled `stop_delay`
/// after the count drops below the threshold, and started fresh on the next
/// crossing. An error returned by the job goes through the exception hooks.
pub fn while_subscribed_plugin<S, I, A, F, Fut>(
    min_subscribers: usize,
    stop_delay: Duration,
    job: F,
) -> StorePlugin<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
    F: Fn(PipelineContext<S, I, A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let job = Arc::new(job);

    StorePlugin::builder()
        .name("while_subscribed")
        .on_start(move |ctx| {
            let job = job.clone();
            ctx.spawn(move |ctx| async move {
                let counter = ctx.subscriber_watch();
                let token = ctx.cancellation_token();
                while_subscribed(counter, min_subscribers, stop_delay, token, move || {
                    let job = job.clone();
                    let ctx = ctx.clone();
                    async move {
                        if let Err(e) = job(ctx.clone()).await {
                            ctx.inner.handle_failure(&ctx, e).await;
                        }
                    }
                })
                .await;
                Ok(())
            });
            async { Ok(()) }
        })
        .build()
}
