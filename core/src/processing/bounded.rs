use std::collections::VecDeque;

/// Fixed-capacity FIFO that evicts its oldest entry on overflow.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    max_capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_capacity),
            max_capacity,
        }
    }

    /// Appends an item, returning the evicted oldest entry when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.max_capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.max_capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Removes and returns every entry, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_capacity
    }
}

impl<T: Copy> BoundedBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().copied().collect()
    }
}
