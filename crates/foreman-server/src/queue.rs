//! Shared FIFO queues
//!
//! The three transport queues are plain `VecDeque`s behind a mutex, with
//! `Notify`-based wakeups so `get`/`put` can wait with a timeout and
//! without holding any lock across a suspension point. Consumers and
//! producers are woken through separate notifiers; the enable-then-check
//! sequence below is the documented `Notified` pattern that closes the
//! check/park race.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct SharedQueue<T> {
    items: Mutex<VecDeque<T>>,
    bound: Option<usize>,
    consumers: Notify,
    producers: Notify,
}

impl<T> SharedQueue<T> {
    pub(crate) fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            bound: None,
            consumers: Notify::new(),
            producers: Notify::new(),
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn bounded(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            bound: Some(capacity),
            consumers: Notify::new(),
            producers: Notify::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().expect("queue mutex poisoned").len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn try_pop(&self) -> Option<T> {
        let item = self.items.lock().expect("queue mutex poisoned").pop_front();
        if item.is_some() {
            self.producers.notify_one();
        }
        item
    }

    pub(crate) fn try_push(&self, item: T) -> Result<(), T> {
        {
            let mut items = self.items.lock().expect("queue mutex poisoned");
            if let Some(bound) = self.bound {
                if items.len() >= bound {
                    return Err(item);
                }
            }
            items.push_back(item);
        }
        self.consumers.notify_one();
        Ok(())
    }

    /// Pop the front item, waiting up to `timeout` for one to appear.
    pub(crate) async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut notified = pin!(self.consumers.notified());
        loop {
            notified.as_mut().enable();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified.as_mut())
                .await
                .is_err()
            {
                return None;
            }
            notified.set(self.consumers.notified());
        }
    }

    /// Push an item, waiting up to `timeout` for space on a bounded
    /// queue. On timeout the item is handed back.
    pub(crate) async fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        let mut pending = item;
        let deadline = Instant::now() + timeout;
        let mut notified = pin!(self.producers.notified());
        loop {
            notified.as_mut().enable();
            match self.try_push(pending) {
                Ok(()) => return Ok(()),
                Err(rejected) => pending = rejected,
            }
            if tokio::time::timeout_at(deadline, notified.as_mut())
                .await
                .is_err()
            {
                return Err(pending);
            }
            notified.set(self.producers.notified());
        }
    }

    /// Take everything currently queued.
    pub(crate) fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = self
            .items
            .lock()
            .expect("queue mutex poisoned")
            .drain(..)
            .collect();
        if !drained.is_empty() {
            // Free any producers parked on a bounded queue.
            self.producers.notify_waiters();
        }
        drained
    }
}
