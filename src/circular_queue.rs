use num_traits::Float;
use std::collections::VecDeque;
use std::fmt;

/// Fixed-capacity FIFO, oldest item first. Pushing into a full queue evicts the oldest item.
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Clone for CircularQueue<T> {
    fn clone(&self) -> Self {
        Self {
            deque: self.deque.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deque.fmt(f)
    }
}

impl<T> CircularQueue<T> {
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        let capacity = cap.max(1);

        Self {
            deque: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, returning the evicted oldest item if the queue was full.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.deque.pop_front()
        } else {
            None
        };

        self.deque.push_back(item);

        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() == self.capacity
    }

    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.deque.back()
    }

    /// The two most recent items as `(previous, latest)`.
    #[inline]
    pub fn latest_pair(&self) -> Option<(&T, &T)> {
        let n = self.deque.len();
        if n < 2 {
            return None;
        }

        Some((&self.deque[n - 2], &self.deque[n - 1]))
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter()
    }
}

impl<T: Float> CircularQueue<T> {
    pub fn mean(&self) -> Option<T> {
        if self.deque.is_empty() {
            return None;
        }

        let sum = self.deque.iter().fold(T::zero(), |acc, &x| acc + x);
        let n = T::from(self.deque.len())?;

        Some(sum / n)
    }
}
