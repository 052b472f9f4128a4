use std::collections::VecDeque;
use std::sync::Mutex;

/// FIFO buffer that keeps the last `capacity` entries.
///
/// Eviction and append happen under one lock.
pub struct BoundedHistory<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `item`, returning the entry evicted to make room for it.
    /// A zero-capacity buffer hands `item` straight back.
    pub fn push(&self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(item);
        evicted
    }

    /// Entries in insertion order, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
