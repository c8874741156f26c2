// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::Request;
use async_channel::{Receiver, Sender};
use ringlog::error;

/// Unbounded FIFO shared by the generator and every dispatch worker.
///
/// Each enqueued item is handed to exactly one `dequeue` caller. The queue
/// holds both ends of the channel, so it stays open for as long as any clone
/// is alive.
pub struct Queue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

// a derive would needlessly require `T: Clone`
impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

pub type RequestQueue = Queue<Request>;

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded::<T>();

        Self { tx, rx }
    }

    /// Adds an item at the tail. Never blocks.
    pub fn enqueue(&self, item: T) {
        if self.tx.try_send(item).is_err() {
            error!("queue is closed, item dropped");
        }
    }

    /// Waits for the item at the head. Returns `None` only if the queue was
    /// closed.
    pub async fn dequeue(&self) -> Option<T> {
        self.rx.recv().await.ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
