// src/history.rs
use std::collections::VecDeque;

use crate::types::FeatureVector;

/// Bounded append-only queue; the oldest entry is evicted once full.
#[derive(Clone, Debug)]
pub struct RollingHistory<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

pub type FeatureHistory = RollingHistory<FeatureVector>;

impl<T> RollingHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a value and returns the evicted one, if any.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.buffer.len() == self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(value);
        evicted
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.buffer.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl RollingHistory<f32> {
    pub fn mean(&self) -> f32 {
        mean_std(self.buffer.iter().copied()).0
    }

    pub fn variance(&self) -> f32 {
        let (_, std) = mean_std(self.buffer.iter().copied());
        std * std
    }
}

/// Population mean and standard deviation; `(0, 0)` for an empty input.
pub fn mean_std(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for v in values {
        let v = v as f64;
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean as f32, variance.sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn evicts_oldest_when_full() {
        let mut history = RollingHistory::new(3);
        assert_eq!(history.push(1), None);
        history.push(2);
        history.push(3);
        assert!(history.is_full());
        assert_eq!(history.push(4), Some(1));
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(history.latest(), Some(&4));
    }
    #[test]
    fn zero_capacity_is_promoted_to_one() {
        let mut history = RollingHistory::new(0);
        history.push(1.0f32);
        history.push(2.0);
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }
    #[test]
    fn mean_and_variance() {
        let mut history = RollingHistory::new(8);
        for v in [2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            history.push(v);
        }
        assert!((history.mean() - 5.0).abs() < 1e-6);
        assert!((history.variance() - 4.0).abs() < 1e-5);
        assert_eq!(mean_std(std::iter::empty()), (0.0, 0.0));
    }
}
