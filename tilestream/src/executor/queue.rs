//! Bounded FIFO work queue with drop-oldest overflow.
//!
//! When the queue is full a push still succeeds: the oldest waiting item is
//! displaced and handed back to the caller, which is responsible for telling
//! whoever was waiting on it. Newest requests are the ones the viewport still
//! cares about, so old ones are sacrificed first.
//!
//! # Example
//!
//! ```
//! use tilestream::executor::{PushOutcome, WorkQueue};
//!
//! let queue = WorkQueue::new(2);
//! queue.push("a");
//! queue.push("b");
//!
//! // Full: "a" is displaced
//! assert_eq!(queue.push("c"), PushOutcome::Displaced("a"));
//! assert_eq!(queue.try_pop(), Some("b"));
//! ```

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// What happened to a pushed item.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// Queued with room to spare.
    Accepted,
    /// Queued; the returned oldest item was dropped to make room.
    Displaced(T),
    /// The queue is closed; the item is handed back.
    Rejected(T),
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer, multi-consumer bounded queue.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> WorkQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append an item, displacing the oldest one if the queue is full.
    pub fn push(&self, item: T) -> PushOutcome<T> {
        let mut state = self.state.lock();
        if state.closed {
            return PushOutcome::Rejected(item);
        }

        let displaced = if state.items.len() >= self.capacity {
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();

        match displaced {
            Some(old) => PushOutcome::Displaced(old),
            None => PushOutcome::Accepted,
        }
    }

    /// Take the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Take the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Close the queue and return everything still waiting.
    ///
    /// Blocked consumers wake up and see `None`; later pushes are rejected.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.closed = true;
        let remaining = state.items.drain(..).collect();
        drop(state);
        self.available.notify_all();
        remaining
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new(4);
        assert_eq!(queue.push(1), PushOutcome::Accepted);
        assert_eq!(queue.push(2), PushOutcome::Accepted);
        assert_eq!(queue.push(3), PushOutcome::Accepted);

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = WorkQueue::new(3);
        for i in 0..3 {
            queue.push(i);
        }
        assert_eq!(queue.push(3), PushOutcome::Displaced(0));
        assert_eq!(queue.push(4), PushOutcome::Displaced(1));
        assert_eq!(queue.len(), 3);

        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![2, 3, 4]);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let queue = WorkQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push('a');
        assert_eq!(queue.push('b'), PushOutcome::Displaced('a'));
    }

    #[test]
    fn test_close_returns_remaining_and_rejects() {
        let queue = WorkQueue::new(4);
        queue.push("x");
        queue.push("y");

        assert_eq!(queue.close(), vec!["x", "y"]);
        assert!(queue.is_closed());
        assert_eq!(queue.push("z"), PushOutcome::Rejected("z"));
        assert_eq!(queue.pop_blocking(), None);
    }

    #[test]
    fn test_pop_blocking_wakes_on_push_and_close() {
        let queue = Arc::new(WorkQueue::new(4));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = queue.pop_blocking() {
                    seen.push(item);
                }
                seen
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(10);
        queue.push(20);
        // Give the consumer a chance to drain before closing
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        queue.close();

        assert_eq!(consumer.join().unwrap(), vec![10, 20]);
    }
}
