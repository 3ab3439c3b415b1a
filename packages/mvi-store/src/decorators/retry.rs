use std::time::Duration;

use tracing::warn;

use crate::core::{MviAction, MviIntent, MviState};
use crate::decorator::PluginDecorator;
use crate::error::is_contract_violation;

/// Retry a failing intent hook up to `max_attempts` times in total, waiting
/// `delay` between attempts.
///
/// Calls `proceed` more than once, so it is exempt from verification.
/// Contract violations are never retried.
pub fn retry_intents_decorator<S, I, A>(max_attempts: u32, delay: Duration) -> PluginDecorator<S, I, A>
where
    S: MviState,
    I: MviIntent,
    A: MviAction,
{
    let max_attempts = max_attempts.max(1);

    PluginDecorator::builder("retry_intents")
        .skip_verification()
        .on_intent(move |_, proceed, intent: I| async move {
            let mut attempt = 1;
            loop {
                match proceed.proceed(intent.clone()).await {
                    Ok(out) => return Ok(out),
                    Err(e) if attempt >= max_attempts || is_contract_violation(&e) => return Err(e),
                    Err(e) => {
                        warn!(attempt, max_attempts, error = %e, "intent hook failed, retrying");
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        })
        .build()
}
