use std::collections::VecDeque;

/// Fixed-capacity FIFO history. Inserting into a full buffer evicts the
/// oldest sample.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    window: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> RollingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(item);
    }

    pub fn latest(&self) -> Option<T> {
        self.window.back().copied()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.window.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut buffer = RollingBuffer::new(3);
        for value in 1..=5 {
            buffer.push(value);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.to_vec(), vec![3, 4, 5]);
        assert_eq!(buffer.latest(), Some(5));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = RollingBuffer::new(100);
        for value in 0..1_000 {
            buffer.push(value as f64);
            assert!(buffer.len() <= buffer.capacity());
        }
    }
}
