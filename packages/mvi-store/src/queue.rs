//! Bounded, overflow-aware queue shared by intents and actions.
//!
//! `tokio::sync::mpsc` cannot evict its oldest item and only supports one
//! receiver, so the store uses this small queue instead:
//!
//! - `push` suspends under [`BufferOverflow::Suspend`] while full
//! - `try_push` never suspends; under [`BufferOverflow::DropOldest`] it evicts
//!   and hands the evicted item back to the caller
//! - `pop` may be awaited by many consumers at once; every item goes to
//!   exactly one of them

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::config::BufferOverflow;

/// Why an item could not be queued.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushError<T> {
    /// The queue is closed; the item is handed back.
    Closed(T),
    /// The queue is full and the policy suspends; the item is handed back.
    Full(T),
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    overflow: BufferOverflow,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedQueue<T> {
    pub(crate) fn new(capacity: usize, overflow: BufferOverflow) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            capacity,
            overflow,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an item without waiting.
    ///
    /// Returns the evicted item when the drop-oldest policy made room.
    pub(crate) fn try_push(&self, item: T) -> Result<Option<T>, PushError<T>> {
        let evicted = {
            let mut state = self.lock();
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                None
            } else {
                match self.overflow {
                    BufferOverflow::Suspend => return Err(PushError::Full(item)),
                    BufferOverflow::DropOldest => {
                        let oldest = state.items.pop_front();
                        state.items.push_back(item);
                        oldest
                    }
                }
            }
        };
        self.not_empty.notify_one();
        Ok(evicted)
    }

    /// Queue an item, suspending while the queue is full.
    ///
    /// Hands the item back if the queue is (or becomes) closed.
    pub(crate) async fn push(&self, item: T) -> Result<Option<T>, T> {
        let mut item = item;
        loop {
            // Register for notification BEFORE checking capacity
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(item) {
                Ok(evicted) => return Ok(evicted),
                Err(PushError::Closed(back)) => return Err(back),
                Err(PushError::Full(back)) => item = back,
            }

            notified.await;
        }
    }

    /// Take the next item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub(crate) async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                let next = state.items.pop_front();
                if let Some(item) = next {
                    let more = !state.items.is_empty();
                    drop(state);
                    self.not_full.notify_one();
                    if more {
                        // Pass the wakeup on so other consumers see the rest
                        self.not_empty.notify_one();
                    }
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the next item if one is buffered.
    pub(crate) fn try_pop(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Close the queue. Blocked producers get their items back and
    /// consumers drain what is left, then see `None`.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Remove and return everything still buffered.
    pub(crate) fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = self.lock().items.drain(..).collect();
        self.not_full.notify_waiters();
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = BoundedQueue::new(4, BufferOverflow::Suspend);
        for i in 0..4 {
            assert_eq!(queue.try_push(i), Ok(None));
        }
        for i in 0..4 {
            assert_eq!(queue.pop().await, Some(i));
        }
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_drop_oldest_evicts() {
        let queue = BoundedQueue::new(2, BufferOverflow::DropOldest);
        assert_eq!(queue.try_push(1), Ok(None));
        assert_eq!(queue.try_push(2), Ok(None));
        assert_eq!(queue.try_push(3), Ok(Some(1)));
        assert_eq!(queue.drain(), vec![2, 3]);
    }

    #[test]
    fn test_suspend_policy_reports_full_on_try_push() {
        let queue = BoundedQueue::new(1, BufferOverflow::Suspend);
        assert_eq!(queue.try_push("a"), Ok(None));
        assert_eq!(queue.try_push("b"), Err(PushError::Full("b")));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_push_suspends_until_space() {
        let queue = Arc::new(BoundedQueue::new(1, BufferOverflow::Suspend));
        queue.try_push(1).unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(2).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!producer.is_finished(), "producer should be suspended");

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(producer.await.unwrap(), Ok(None));
        assert_eq!(queue.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let queue = Arc::new(BoundedQueue::<u8>::new(1, BufferOverflow::Suspend));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        queue.close();
        assert_eq!(consumer.await.unwrap(), None);
        assert!(queue.is_closed());
        assert_eq!(queue.try_push(1), Err(PushError::Closed(1)));
    }

    #[tokio::test]
    async fn test_competing_consumers_each_item_once() {
        let queue = Arc::new(BoundedQueue::new(128, BufferOverflow::Suspend));
        let mut consumers = vec![];
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut got = vec![];
                while let Some(item) = queue.pop().await {
                    got.push(item);
                }
                got
            }));
        }

        for i in 0..100 {
            queue.push(i).await.unwrap();
        }
        // Let consumers drain before closing
        while queue.len() > 0 {
            tokio::task::yield_now().await;
        }
        queue.close();

        let mut all = vec![];
        for c in consumers {
            all.extend(c.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
