//! Subscriber counting and the "active only while observed" window.
//!
//! ```text
//! count:   0 ──► 1 ──► 0 ───(< stop_delay)──► 1 ──► 0 ───(stop_delay)──► ✕
//! job:         start        still running              keeps running    cancelled
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Live count of attached subscribers.
#[derive(Debug, Clone)]
pub struct SubscriberCount {
    tx: Arc<watch::Sender<usize>>,
}

impl SubscriberCount {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Record an attach and return the new count.
    pub fn increment(&self) -> usize {
        let mut now = 0;
        self.tx.send_modify(|count| {
            *count += 1;
            now = *count;
        });
        now
    }

    /// Record a detach and return the new count. Never goes below zero.
    pub fn decrement(&self) -> usize {
        let mut now = 0;
        self.tx.send_modify(|count| {
            *count = count.saturating_sub(1);
            now = *count;
        });
        now
    }

    pub fn get(&self) -> usize {
        *self.tx.borrow()
    }

    /// A receiver that observes every change.
    pub fn watch(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}

impl Default for SubscriberCount {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `block` only while at least `min_subscribers` are attached.
///
/// - The job starts once the count reaches the threshold.
/// - When the count drops below the threshold it is cancelled only after
///   `stop_delay` has passed without the threshold being met again.
/// - If the threshold is met again within `stop_delay`, the job keeps
///   running untouched.
/// - After a cancellation the next crossing starts a fresh job.
///
/// A job that finishes on its own is not restarted until the count has
/// dropped below the threshold and risen again.
///
/// The job is polled as part of this future rather than spawned, so it is
/// dropped the moment this future is. Returns once `token` is cancelled.
pub async fn while_subscribed<F, Fut>(
    mut counter: watch::Receiver<usize>,
    min_subscribers: usize,
    stop_delay: Duration,
    token: CancellationToken,
    mut block: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let min = min_subscribers.max(1);

    loop {
        // Wait for enough subscribers
        tokio::select! {
            _ = token.cancelled() => return,
            reached = wait_until(&mut counter, |n| n >= min) => {
                if !reached {
                    return;
                }
            }
        }

        debug!(min, "subscriber threshold reached, starting job");
        let mut job = Box::pin(block());
        let mut finished = false;

        'active: loop {
            // Wait for the count to drop, driving the job meanwhile
            tokio::select! {
                _ = token.cancelled() => return,
                _ = &mut job, if !finished => {
                    trace!("job finished on its own");
                    finished = true;
                    continue 'active;
                }
                dropped = wait_until(&mut counter, |n| n < min) => {
                    if !dropped {
                        return;
                    }
                }
            }

            // Debounce the stop; the job keeps running during the delay
            let back = {
                let debounce = async {
                    tokio::select! {
                        _ = tokio::time::sleep(stop_delay) => Some(false),
                        back = wait_until(&mut counter, |n| n >= min) => back.then_some(true),
                    }
                };
                tokio::pin!(debounce);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = &mut job, if !finished => {
                            trace!("job finished on its own");
                            finished = true;
                        }
                        outcome = &mut debounce => break outcome,
                    }
                }
            };

            match back {
                Some(true) => trace!("threshold met again within stop delay, job keeps running"),
                Some(false) => {
                    debug!(?stop_delay, "below subscriber threshold, stopping job");
                    break 'active;
                }
                None => return,
            }
        }
    }
}

/// Wait until the watched count satisfies `pred`. Returns `false` if the
/// sender is gone.
async fn wait_until(counter: &mut watch::Receiver<usize>, pred: impl Fn(usize) -> bool) -> bool {
    counter.wait_for(|n| pred(*n)).await.is_ok()
}
