//! Testing utilities for stores and plugins.
//!
//! Enabled under `cfg(test)` and with the `testing` feature.
//!
//! ## Recording hook order with `HookRecorder`
//!
//! ```ignore
//! use mvi_store::testing::HookRecorder;
//!
//! let recorder = HookRecorder::new();
//! let store = Store::builder(0)
//!     .install(recorder.plugin("outer"))
//!     .install(recorder.plugin("inner"))
//!     .build()?;
//!
//! store.start(&CancellationToken::new())?;
//! store.close_and_wait().await;
//! assert_eq!(recorder.entries_for("on_stop"), vec!["inner:on_stop", "outer:on_stop"]);
//! ```
//!
//! ## Waiting for callbacks with `EventLatch`
//!
//! ```ignore
//! let latch = Arc::new(EventLatch::new(3));
//! store.subscribe_with(|_| {}, {
//!     let latch = latch.clone();
//!     move |_| latch.dec()
//! })?;
//!
//! latch.await_zero().await;  // three actions delivered
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::core::{MviAction, MviIntent, MviState};
use crate::plugin::StorePlugin;

/// Records `"<plugin>:<hook>"` entries from any number of plugins into one
/// shared, ordered log.
#[derive(Debug, Clone, Default)]
pub struct HookRecorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl HookRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
    }

    /// A pass-through plugin named `name` that records every hook it sees.
    pub fn plugin<S, I, A>(&self, name: &'static str) -> StorePlugin<S, I, A>
    where
        S: MviState,
        I: MviIntent,
        A: MviAction,
    {
        let r = self.clone();
        let record = move |hook: &str| r.push(format!("{name}:{hook}"));
        let (r1, r2, r3, r4, r5, r6, r7, r8, r9, r10) = (
            record.clone(),
            record.clone(),
            record.clone(),
            record.clone(),
            record.clone(),
            record.clone(),
            record.clone(),
            record.clone(),
            record.clone(),
            record,
        );

        StorePlugin::builder()
            .name(name)
            .on_start(move |_| {
                r1("on_start");
                async { Ok(()) }
            })
            .on_intent(move |_, intent| {
                r2("on_intent");
                async move { Ok(Some(intent)) }
            })
            .on_state(move |_, _, new| {
                r3("on_state");
                async move { Ok(Some(new)) }
            })
            .on_action(move |_, action| {
                r4("on_action");
                async move { Ok(Some(action)) }
            })
            .on_exception(move |_, e| {
                r5("on_exception");
                async move { Some(e) }
            })
            .on_subscribe(move |_, _| {
                r6("on_subscribe");
                async { Ok(()) }
            })
            .on_unsubscribe(move |_, _| {
                r7("on_unsubscribe");
                async { Ok(()) }
            })
            .on_stop(move |_| r8("on_stop"))
            .on_undelivered_intent(move |_| r9("on_undelivered_intent"))
            .on_undelivered_action(move |_| r10("on_undelivered_action"))
            .build()
    }

    /// Every entry, in the order recorded.
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Entries for one hook, in the order recorded.
    pub fn entries_for(&self, hook: &str) -> Vec<String> {
        let suffix = format!(":{hook}");
        self.entries()
            .into_iter()
            .filter(|entry| entry.ends_with(&suffix))
            .collect()
    }

    /// How many times `entry` was recorded.
    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// A countdown latch for waiting on an exact number of callbacks.
///
/// Tests should wait for meaning, not time.
///
/// For tests that might hang, wrap the wait in `tokio::time::timeout`:
///
/// ```ignore
/// timeout(Duration::from_secs(5), latch.await_zero())
///     .await
///     .expect("latch timed out");
/// ```
#[derive(Debug)]
pub struct EventLatch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl EventLatch {
    /// Create a latch expecting `expected` events.
    pub fn new(expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
            notify: Notify::new(),
        }
    }

    /// Count one event.
    ///
    /// # Panics
    ///
    /// Panics when called more often than expected.
    pub fn dec(&self) {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            panic!("EventLatch decremented below zero - more events than expected");
        }
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Wait for the count to reach zero.
    pub async fn await_zero(&self) {
        loop {
            // Register for notification BEFORE checking count
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}
