//! Bounded queue that evicts the oldest item instead of blocking.
//!
//! The producer keeps a receiver handle of its own channel; when the channel
//! is full it pops the head and retries. Sends never block, and the consumer
//! always sees the most recent `capacity` items.

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Producer side of a drop-oldest queue. Dropping it closes the queue.
#[derive(Debug)]
pub(crate) struct DropOldestSender<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
}

/// Creates a drop-oldest queue holding at most `capacity` items.
pub(crate) fn drop_oldest<T>(capacity: usize) -> (DropOldestSender<T>, Receiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let sender = DropOldestSender {
        tx,
        evict: rx.clone(),
    };
    (sender, rx)
}

impl<T> DropOldestSender<T> {
    /// Enqueues `item`, evicting older items as needed.
    ///
    /// Returns the number of items dropped to make room.
    pub(crate) fn push(&self, mut item: T) -> usize {
        let mut dropped = 0;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(rejected)) => {
                    item = rejected;
                    // The consumer may have drained concurrently; just retry then.
                    if self.evict.try_recv().is_ok() {
                        dropped += 1;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }
}
