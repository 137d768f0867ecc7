//! The in-memory front queue.
//!
//! Interactively triggered jobs are offered here after submission so
//! the pool can claim them ahead of the next backlog scan. The queue
//! is advisory: an offered id that is dropped (queue full) or lost to
//! a competing claim is still covered by the persisted backlog.

use parking_lot::Mutex;
use std::collections::VecDeque;
use uuid::Uuid;

/// A bounded FIFO of job ids awaiting immediate processing.
#[derive(Debug)]
pub struct FrontQueue {
    capacity: usize,
    slots: Mutex<VecDeque<Uuid>>,
}

impl FrontQueue {
    /// Creates a queue holding at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(VecDeque::new()),
        }
    }

    /// Offers a job id. Returns `false` when the queue is full; the
    /// job stays in the persisted backlog either way.
    pub fn offer(&self, id: Uuid) -> bool {
        let mut slots = self.slots.lock();
        if slots.len() >= self.capacity {
            return false;
        }
        slots.push_back(id);
        true
    }

    /// Takes the oldest offered id, if any.
    pub fn take(&self) -> Option<Uuid> {
        self.slots.lock().pop_front()
    }

    /// Number of ids currently queued.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True when no ids are queued.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let queue = FrontQueue::new(4);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(queue.offer(a));
        assert!(queue.offer(b));
        assert_eq!(queue.take(), Some(a));
        assert_eq!(queue.take(), Some(b));
        assert_eq!(queue.take(), None);
    }

    #[test]
    fn rejects_when_full() {
        let queue = FrontQueue::new(2);
        assert!(queue.offer(Uuid::new_v4()));
        assert!(queue.offer(Uuid::new_v4()));
        assert!(!queue.offer(Uuid::new_v4()));
        assert_eq!(queue.len(), 2);

        queue.take();
        assert!(queue.offer(Uuid::new_v4()));
    }
}
