//! A bounded queue that never blocks its producer.
//!
//! Read pumps push every frame that is not a device arrival into this queue
//! and the request correlator pops them while waiting for a reply. When the
//! correlator falls behind, the configured [`OverflowPolicy`] decides which
//! frame is sacrificed.

use std::time::Duration;

use flume::{Receiver, Sender, TrySendError};

/// Decides what happens when an item is pushed into a full queue.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OverflowPolicy {
    /// Evicts the oldest queued item to make room for the new one.
    DropOldest,

    /// Discards the item that was about to be pushed.
    DropNewest,
}

/// Represents a bounded multi-producer queue with a configurable overflow
/// policy.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    policy: OverflowPolicy,
}

impl<T> BoundedQueue<T> {
    /// Creates a new queue holding at most `capacity` items.
    ///
    /// A capacity of zero is raised to one, as a rendezvous queue could never
    /// hold anything for a producer that refuses to wait.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = flume::bounded(capacity.max(1));
        Self { tx, rx, policy }
    }

    /// Pushes an item without ever blocking.
    ///
    /// Returns the item that was dropped to honor the capacity, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let mut item = item;
        let mut evicted = None;

        loop {
            match self.tx.try_send(item) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(rejected)) => match self.policy {
                    OverflowPolicy::DropNewest => return Some(rejected),
                    OverflowPolicy::DropOldest => {
                        // The consumer may have taken an item in the meantime, in which case
                        // there is nothing to evict and the next attempt succeeds.
                        if let Ok(oldest) = self.rx.try_recv() {
                            evicted = Some(oldest);
                        }
                        item = rejected;
                    },
                },
                // Both ends are owned by the queue itself.
                Err(TrySendError::Disconnected(rejected)) => return Some(rejected),
            }
        }
    }

    /// Waits for the next item for at most `timeout`.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.rx.recv_async())
            .await
            .ok()
            .and_then(Result::ok)
    }

    /// Takes the next item if one is queued.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Removes all queued items, returning how many there were.
    pub fn clear(&self) -> usize {
        self.rx.drain().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_oldest_keeps_the_freshest_items() {
        let queue = BoundedQueue::new(5, OverflowPolicy::DropOldest);

        for i in 0..5 {
            assert_eq!(queue.push(i), None);
        }
        assert_eq!(queue.push(5), Some(0));
        assert_eq!(queue.push(6), Some(1));

        let drained: Vec<i32> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn drop_newest_keeps_the_backlog() {
        let queue = BoundedQueue::new(2, OverflowPolicy::DropNewest);

        assert_eq!(queue.push('a'), None);
        assert_eq!(queue.push('b'), None);
        assert_eq!(queue.push('c'), Some('c'));
        assert_eq!(queue.try_pop(), Some('a'));
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = BoundedQueue::new(3, OverflowPolicy::DropOldest);
        queue.push(1);
        queue.push(2);

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pop_times_out_on_an_empty_queue() {
        let queue = BoundedQueue::<u8>::new(1, OverflowPolicy::DropOldest);
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, None);

        queue.push(7);
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, Some(7));
    }
}
