use std::time::Duration;

use tracing::warn;

use crate::core::{MviAction, MviIntent, MviState};
use crate::decorator::PluginDecorator;
use crate::error::StoreError;

/// Fail an intent with [`StoreError::Timeout`] when the intent hooks take
/// longer than `duration`.
pub fn intent_timeout_decorator<S, I, A>(duration: Duration) -> PluginDecorator<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    PluginDecorator::builder("intent_timeout")
        .on_intent(move |_, proceed, intent| async move {
            match tokio::time::timeout(duration, proceed.proceed(intent)).await {
                Ok(out) => out,
                Err(_) => {
                    warn!(?duration, "intent hook timed out");
                    Err(StoreError::Timeout { duration }.into())
                }
            }
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::decorate;
    use crate::plugin::StorePlugin;
    use crate::store::Store;

    #[tokio::test(start_paused = true)]
    async fn test_slow_intent_hook_times_out() {
        let slow: StorePlugin<i32, i32, ()> = StorePlugin::builder()
            .on_intent(|_, i| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Some(i))
            })
            .build();
        let ctx = Store::builder(0).build().unwrap().context();

        let decorated = decorate(slow, &[intent_timeout_decorator(Duration::from_secs(1))], true);
        let err = decorated.intent(ctx, 1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Timeout { .. })
        ));
    }
}
