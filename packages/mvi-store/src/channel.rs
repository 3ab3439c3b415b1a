//! Action channel with three delivery disciplines.
//!
//! # Guarantees
//!
//! - **Distribute**: each action reaches exactly one attached subscriber
//!   (whichever is ready first); actions buffer while nobody listens
//! - **Restrict**: same queueing, but at most one subscriber at a time
//! - **Share**: every attached subscriber gets every action; newcomers first
//!   receive the last `replay` actions
//!
//! Actions evicted by [`BufferOverflow::DropOldest`] are handed to the
//! undelivered sink supplied by the store, and `close` returns everything
//! still buffered. Actions left in a detached Share subscriber's queue are
//! held back and reported on the next emission or at close. Nothing
//! disappears without being reported.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Mutex as AsyncMutex;

use crate::config::{ActionShareBehavior, BufferOverflow};
use crate::error::StoreError;
use crate::queue::BoundedQueue;

/// Callback receiving actions that were dropped before delivery.
pub(crate) type UndeliveredSink<'a, A> = &'a (dyn Fn(A) + Send + Sync);

pub(crate) struct ActionChannel<A> {
    kind: ChannelKind<A>,
}

enum ChannelKind<A> {
    Queue {
        queue: Arc<BoundedQueue<A>>,
        exclusive: Option<Arc<AtomicBool>>,
    },
    Share(Arc<SharedActions<A>>),
    Disabled,
}

impl<A: Clone + Send + Sync + 'static> ActionChannel<A> {
    pub(crate) fn new(behavior: &ActionShareBehavior) -> Self {
        let kind = match *behavior {
            ActionShareBehavior::Distribute {
                buffer_size,
                overflow,
            } => ChannelKind::Queue {
                queue: Arc::new(BoundedQueue::new(buffer_size, overflow)),
                exclusive: None,
            },
            ActionShareBehavior::Restrict {
                buffer_size,
                overflow,
            } => ChannelKind::Queue {
                queue: Arc::new(BoundedQueue::new(buffer_size, overflow)),
                exclusive: Some(Arc::new(AtomicBool::new(false))),
            },
            ActionShareBehavior::Share {
                buffer_size,
                replay,
                overflow,
            } => ChannelKind::Share(Arc::new(SharedActions::new(buffer_size, replay, overflow))),
            ActionShareBehavior::Disabled => ChannelKind::Disabled,
        };
        Self { kind }
    }

    /// Deliver an action per the configured discipline.
    ///
    /// May suspend under the suspend overflow policy.
    pub(crate) async fn emit(
        &self,
        action: A,
        undelivered: UndeliveredSink<'_, A>,
    ) -> Result<(), StoreError> {
        match &self.kind {
            ChannelKind::Queue { queue, .. } => match queue.push(action).await {
                Ok(Some(evicted)) => {
                    undelivered(evicted);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(_) => Err(StoreError::StoreClosed),
            },
            ChannelKind::Share(shared) => shared.emit(action, undelivered).await,
            ChannelKind::Disabled => Err(StoreError::ActionsDisabled),
        }
    }

    /// Attach a new receiver.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubscriberAlreadyAttached`] under `Restrict` when a
    /// receiver is already attached.
    pub(crate) fn subscribe(&self) -> Result<ActionReceiver<A>, StoreError> {
        let kind = match &self.kind {
            ChannelKind::Queue { queue, exclusive } => {
                if let Some(slot) = exclusive {
                    slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .map_err(|_| StoreError::SubscriberAlreadyAttached)?;
                }
                ReceiverKind::Queue {
                    queue: queue.clone(),
                    slot: exclusive.clone(),
                }
            }
            ChannelKind::Share(shared) => shared.subscribe()?,
            ChannelKind::Disabled => ReceiverKind::Disabled,
        };
        Ok(ActionReceiver { kind })
    }

    /// Close the channel and return every action still buffered.
    pub(crate) fn close(&self) -> Vec<A> {
        match &self.kind {
            ChannelKind::Queue { queue, .. } => {
                queue.close();
                queue.drain()
            }
            ChannelKind::Share(shared) => shared.close(),
            ChannelKind::Disabled => Vec::new(),
        }
    }
}

impl<A> std::fmt::Debug for ActionChannel<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let discipline = match &self.kind {
            ChannelKind::Queue {
                exclusive: None, ..
            } => "distribute",
            ChannelKind::Queue { .. } => "restrict",
            ChannelKind::Share(_) => "share",
            ChannelKind::Disabled => "disabled",
        };
        f.debug_struct("ActionChannel")
            .field("discipline", &discipline)
            .finish()
    }
}

// =============================================================================
// Share
// =============================================================================

struct SharedState<A> {
    history: VecDeque<A>,
    subscribers: Vec<(u64, Arc<BoundedQueue<A>>)>,
    /// Backlog of subscribers that detached before reading it.
    orphaned: Vec<A>,
    next_id: u64,
    closed: bool,
}

struct SharedActions<A> {
    buffer_size: usize,
    replay: usize,
    overflow: BufferOverflow,
    state: Mutex<SharedState<A>>,
    /// Serializes emissions so every subscriber sees the same order.
    emit_lock: AsyncMutex<()>,
}

impl<A> SharedActions<A> {
    fn lock(&self) -> MutexGuard<'_, SharedState<A>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn detach(&self, id: u64, queue: &BoundedQueue<A>) {
        let mut state = self.lock();
        state.subscribers.retain(|(sid, _)| *sid != id);
        queue.close();
        let backlog = queue.drain();
        if !state.closed {
            state.orphaned.extend(backlog);
        }
    }
}

impl<A: Clone + Send + Sync + 'static> SharedActions<A> {
    fn new(buffer_size: usize, replay: usize, overflow: BufferOverflow) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            replay,
            overflow,
            state: Mutex::new(SharedState {
                history: VecDeque::with_capacity(replay),
                subscribers: Vec::new(),
                orphaned: Vec::new(),
                next_id: 0,
                closed: false,
            }),
            emit_lock: AsyncMutex::new(()),
        }
    }

    fn subscribe(self: &Arc<Self>) -> Result<ReceiverKind<A>, StoreError> {
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::StoreClosed);
        }

        // Room for the replayed backlog on top of the regular buffer
        let queue = Arc::new(BoundedQueue::new(
            self.buffer_size + self.replay,
            self.overflow,
        ));
        for action in state.history.iter() {
            let _ = queue.try_push(action.clone());
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, queue.clone()));

        Ok(ReceiverKind::Own {
            queue,
            id,
            owner: Arc::downgrade(self),
        })
    }

    async fn emit(&self, action: A, undelivered: UndeliveredSink<'_, A>) -> Result<(), StoreError> {
        let _serial = self.emit_lock.lock().await;

        let (targets, orphaned): (Vec<Arc<BoundedQueue<A>>>, Vec<A>) = {
            let mut state = self.lock();
            if state.closed {
                return Err(StoreError::StoreClosed);
            }
            if self.replay > 0 {
                state.history.push_back(action.clone());
                while state.history.len() > self.replay {
                    state.history.pop_front();
                }
            }
            let targets = state.subscribers.iter().map(|(_, q)| q.clone()).collect();
            (targets, std::mem::take(&mut state.orphaned))
        };

        for action in orphaned {
            undelivered(action);
        }
        for queue in targets {
            match queue.push(action.clone()).await {
                Ok(Some(evicted)) => undelivered(evicted),
                Ok(None) => {}
                // Subscriber detached while we were waiting on it
                Err(action) => undelivered(action),
            }
        }
        Ok(())
    }

    fn close(&self) -> Vec<A> {
        let (subscribers, mut leftovers) = {
            let mut state = self.lock();
            state.closed = true;
            state.history.clear();
            (
                std::mem::take(&mut state.subscribers),
                std::mem::take(&mut state.orphaned),
            )
        };

        for (_, queue) in subscribers {
            queue.close();
            leftovers.extend(queue.drain());
        }
        leftovers
    }
}

// =============================================================================
// Receiver
// =============================================================================

enum ReceiverKind<A> {
    Queue {
        queue: Arc<BoundedQueue<A>>,
        slot: Option<Arc<AtomicBool>>,
    },
    Own {
        queue: Arc<BoundedQueue<A>>,
        id: u64,
        owner: Weak<SharedActions<A>>,
    },
    Disabled,
}

/// Receiving end of the action channel held by one subscriber.
///
/// Dropping the receiver detaches it: under `Restrict` this frees the single
/// subscriber slot, under `Share` it stops further broadcasts to it.
pub struct ActionReceiver<A> {
    kind: ReceiverKind<A>,
}

impl<A> ActionReceiver<A> {
    /// Wait for the next action. Returns `None` once the store closed.
    pub async fn recv(&mut self) -> Option<A> {
        match &self.kind {
            ReceiverKind::Queue { queue, .. } | ReceiverKind::Own { queue, .. } => {
                queue.pop().await
            }
            ReceiverKind::Disabled => None,
        }
    }

    /// Take an action if one is ready.
    pub fn try_recv(&mut self) -> Option<A> {
        match &self.kind {
            ReceiverKind::Queue { queue, .. } | ReceiverKind::Own { queue, .. } => {
                queue.try_pop()
            }
            ReceiverKind::Disabled => None,
        }
    }
}

impl<A> Drop for ActionReceiver<A> {
    fn drop(&mut self) {
        match &self.kind {
            ReceiverKind::Queue {
                slot: Some(slot), ..
            } => slot.store(false, Ordering::Release),
            ReceiverKind::Own { queue, id, owner } => match owner.upgrade() {
                Some(owner) => owner.detach(*id, queue),
                None => queue.close(),
            },
            _ => {}
        }
    }
}

impl<A> std::fmt::Debug for ActionReceiver<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionReceiver").finish_non_exhaustive()
    }
}
