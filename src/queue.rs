//! Unbounded FIFO queue with non-blocking producers.
//!
//! The receive loop must never stall on a full channel, so producers push
//! without blocking while the single consumer awaits items. Ordering is
//! strict FIFO from the perspective of any one producer.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Mutex;

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A thread-safe FIFO queue whose `push` never blocks.
#[derive(Debug)]
pub struct UnboundedQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> UnboundedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Append an item. Never blocks; items pushed after [`close`](Self::close)
    /// are still drained by the consumer.
    pub fn push(&self, item: T) {
        self.inner.lock().unwrap().items.push_back(item);
        self.notify.notify_one();
    }

    /// Remove and return the next item, waiting until one is available.
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        let mut notified = pin!(self.notify.notified());
        loop {
            if let Some(step) = self.try_pop() {
                return step;
            }
            // Register interest before re-checking so a push between the
            // check and the await is not lost.
            notified.as_mut().enable();
            if let Some(step) = self.try_pop() {
                return step;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }

    /// `Some(Some(item))` when an item is ready, `Some(None)` when closed and
    /// drained, `None` when the caller should wait.
    fn try_pop(&self) -> Option<Option<T>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(item) = inner.items.pop_front() {
            return Some(Some(item));
        }
        if inner.closed {
            return Some(None);
        }
        None
    }

    /// Signal that no more items will be pushed. Waiting consumers drain the
    /// remaining items before observing `None`.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn preserves_fifo_order() {
        let queue = UnboundedQueue::new();
        for i in 0..10 {
            queue.push(i);
        }
        for i in 0..10 {
            assert_eq!(queue.pop().await, Some(i));
        }
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let queue = Arc::new(UnboundedQueue::new());

        let consumer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(42u32);

        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn close_drains_remaining_items_first() {
        let queue = UnboundedQueue::new();
        queue.push("a");
        queue.push("b");
        queue.close();

        assert_eq!(queue.pop().await, Some("a"));
        assert_eq!(queue.pop().await, Some("b"));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn close_wakes_a_blocked_consumer() {
        let queue = Arc::new(UnboundedQueue::<u32>::new());

        let consumer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_producers_preserve_per_producer_order() {
        let queue = Arc::new(UnboundedQueue::new());

        let mut producers = Vec::new();
        for producer in 0..4u32 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for seq in 0..25u32 {
                    queue.push((producer, seq));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        queue.close();

        let mut last_seen = [None::<u32>; 4];
        while let Some((producer, seq)) = queue.pop().await {
            let last = &mut last_seen[producer as usize];
            assert!(last.map_or(true, |prev| prev < seq));
            *last = Some(seq);
        }
        assert_eq!(last_seen, [Some(24); 4]);
    }
}
