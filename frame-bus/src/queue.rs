use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// Fixed-capacity FIFO shared between one stage and its worker thread.
///
/// Both channel ends live in the queue, so it never disconnects: `push`
/// fails only because the queue stayed full, and `pop` returns `None` only
/// because it stayed empty.
pub struct BoundedFrameQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> BoundedFrameQueue<T> {
    /// A capacity of zero is raised to one; a rendezvous queue cannot hold
    /// anything for a worker that is busy.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Enqueues `item` if space frees up within `timeout`.
    ///
    /// Returns `false` when the item was dropped. A zero timeout never waits.
    pub fn push(&self, item: T, timeout: Duration) -> bool {
        if timeout.is_zero() {
            self.tx.try_send(item).is_ok()
        } else {
            self.tx.send_timeout(item, timeout).is_ok()
        }
    }

    /// Oldest queued item, or `None` if nothing arrived within `timeout`.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        if timeout.is_zero() {
            self.rx.try_recv().ok()
        } else {
            self.rx.recv_timeout(timeout).ok()
        }
    }

    /// Drains everything currently queued without waiting.
    pub fn try_pop_all(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Clone for BoundedFrameQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> std::fmt::Debug for BoundedFrameQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedFrameQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
