//! Unbounded delivery queue decoupling writers from one consumer.
//!
//! Writers commit under a storage-level write lock; if handing a change
//! batch to subscribers could block on a slow consumer, every writer
//! would stall behind it. `push` therefore appends to an unbounded
//! backlog and returns immediately. A single drain task owns the backlog
//! and offers the oldest undelivered item to the consumer, blocking only
//! on the consumer side. Memory, not throughput, is the only bound.

use tokio::sync::mpsc;

/// Producer handle of a single-producer, single-consumer queue.
///
/// Dropping the handle closes the queue: the drain task flushes the
/// remaining backlog in order, then the consumer observes end-of-stream.
pub struct DeliveryQueue<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> DeliveryQueue<T> {
    /// Creates a queue that delivers every pushed item.
    pub fn new() -> (Self, mpsc::Receiver<T>) {
        Self::with_sieve(Some)
    }

    /// Creates a queue whose drain task runs `sieve` on each item before
    /// delivery; returning `None` drops the item. The sieve runs on the
    /// drain task only, so state captured by it needs no synchronization.
    pub fn with_sieve(
        mut sieve: impl FnMut(T) -> Option<T> + Send + 'static,
    ) -> (Self, mpsc::Receiver<T>) {
        let (tx, mut backlog) = mpsc::unbounded_channel();
        // Capacity 1: the drain task holds at most one undelivered item
        // while waiting for the consumer.
        let (out_tx, out_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            while let Some(item) = backlog.recv().await {
                if let Some(item) = sieve(item) {
                    if out_tx.send(item).await.is_err() {
                        // Consumer went away; stop draining.
                        break;
                    }
                }
            }
        });

        (Self { tx }, out_rx)
    }

    /// Appends an item to the backlog. Never blocks, never fails; pushes
    /// after the consumer disappeared are silently discarded.
    pub fn push(&self, item: T) {
        let _ = self.tx.send(item);
    }
}
