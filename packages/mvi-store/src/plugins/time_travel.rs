//! Bounded recorder of everything that flows through a store.
//!
//! `TimeTravel` keeps the most recent states, intents, actions, exceptions
//! and lifecycle events, each stamped with the time it was observed. It is
//! meant for debugging sessions and tests.
//!
//! # Example
//!
//! ```ignore
//! let recorder = TimeTravel::new(100);
//! let store = Store::builder(Counter::default())
//!     .install(recorder.plugin())
//!     .build()?;
//!
//! // ... later
//! for entry in recorder.states() {
//!     println!("{} {:?}", entry.at, entry.value);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::core::{MviAction, MviIntent, MviState};
use crate::plugin::StorePlugin;

/// A recorded value with the time it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T> {
    pub at: DateTime<Utc>,
    pub value: T,
}

/// Lifecycle events recorded by [`TimeTravel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    Subscribed(usize),
    Unsubscribed(usize),
    Stopped { failed: bool },
}

#[derive(Debug)]
struct Recording<S, I, A> {
    states: VecDeque<Timestamped<S>>,
    intents: VecDeque<Timestamped<I>>,
    actions: VecDeque<Timestamped<A>>,
    exceptions: VecDeque<Timestamped<String>>,
    events: VecDeque<Timestamped<LifecycleEvent>>,
}

fn push_bounded<T>(log: &mut VecDeque<Timestamped<T>>, capacity: usize, value: T) {
    log.push_back(Timestamped {
        at: Utc::now(),
        value,
    });
    while log.len() > capacity {
        log.pop_front();
    }
}

/// Shared recorder. Clones observe the same recording.
#[derive(Debug)]
pub struct TimeTravel<S, I, A> {
    recording: Arc<Mutex<Recording<S, I, A>>>,
    capacity: usize,
}

impl<S, I, A> Clone for TimeTravel<S, I, A> {
    fn clone(&self) -> Self {
        Self {
            recording: self.recording.clone(),
            capacity: self.capacity,
        }
    }
}

impl<S: MviState, I: MviIntent, A: MviAction> TimeTravel<S, I, A> {
    /// Keep at most `capacity` entries per category.
    pub fn new(capacity: usize) -> Self {
        Self {
            recording: Arc::new(Mutex::new(Recording {
                states: VecDeque::new(),
                intents: VecDeque::new(),
                actions: VecDeque::new(),
                exceptions: VecDeque::new(),
                events: VecDeque::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recording<S, I, A>> {
        self.recording.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Plugin feeding this recorder. Passes every event through unchanged.
    pub fn plugin(&self) -> StorePlugin<S, I, A> {
        let (start, intent, state, action, exception, sub, unsub, stop) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );
        let cap = self.capacity;

        StorePlugin::builder()
            .name("time_travel")
            .on_start(move |ctx| {
                let initial = ctx.delicate_state();
                let mut rec = start.lock();
                push_bounded(&mut rec.states, cap, initial);
                push_bounded(&mut rec.events, cap, LifecycleEvent::Started);
                async { Ok(()) }
            })
            .on_intent(move |_, i: I| {
                push_bounded(&mut intent.lock().intents, cap, i.clone());
                async move { Ok(Some(i)) }
            })
            .on_state(move |_, _old, new: S| {
                push_bounded(&mut state.lock().states, cap, new.clone());
                async move { Ok(Some(new)) }
            })
            .on_action(move |_, a: A| {
                push_bounded(&mut action.lock().actions, cap, a.clone());
                async move { Ok(Some(a)) }
            })
            .on_exception(move |_, e| {
                push_bounded(&mut exception.lock().exceptions, cap, format!("{e:#}"));
                async move { Some(e) }
            })
            .on_subscribe(move |_, count| {
                push_bounded(&mut sub.lock().events, cap, LifecycleEvent::Subscribed(count));
                async { Ok(()) }
            })
            .on_unsubscribe(move |_, count| {
                push_bounded(&mut unsub.lock().events, cap, LifecycleEvent::Unsubscribed(count));
                async { Ok(()) }
            })
            .on_stop(move |reason| {
                let failed = reason.is_failure();
                push_bounded(&mut stop.lock().events, cap, LifecycleEvent::Stopped { failed });
            })
            .build()
    }

    pub fn states(&self) -> Vec<Timestamped<S>> {
        self.lock().states.iter().cloned().collect()
    }

    pub fn intents(&self) -> Vec<Timestamped<I>> {
        self.lock().intents.iter().cloned().collect()
    }

    pub fn actions(&self) -> Vec<Timestamped<A>> {
        self.lock().actions.iter().cloned().collect()
    }

    /// Exception messages, including their cause chains.
    pub fn exceptions(&self) -> Vec<Timestamped<String>> {
        self.lock().exceptions.iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<Timestamped<LifecycleEvent>> {
        self.lock().events.iter().cloned().collect()
    }

    pub fn latest_state(&self) -> Option<S> {
        self.lock().states.back().map(|entry| entry.value.clone())
    }

    pub fn clear(&self) {
        let mut rec = self.lock();
        rec.states.clear();
        rec.intents.clear();
        rec.actions.clear();
        rec.exceptions.clear();
        rec.events.clear();
    }
}
