//! Bounded sample history, newest first.

use std::collections::VecDeque;

/// Ring of past vector samples. Age 0 is the most recent push.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct History {
    samples: VecDeque<Vec<f64>>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Record a new sample, dropping the oldest when full.
    pub fn push(&mut self, sample: Vec<f64>) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_back();
        }
        self.samples.push_front(sample);
    }

    pub fn get(&self, age: usize) -> Option<&[f64]> {
        self.samples.get(age).map(Vec::as_slice)
    }

    /// Overwrite the sample at `age`, back-filling missing slots with zeros
    /// of the same length.
    pub fn set(&mut self, age: usize, sample: Vec<f64>) {
        if age >= self.capacity {
            return;
        }
        while self.samples.len() <= age {
            self.samples.push_back(vec![0.0; sample.len()]);
        }
        self.samples[age] = sample;
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Change capacity, keeping the newest samples.
    pub fn resize(&mut self, capacity: usize) {
        self.samples.truncate(capacity);
        self.capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest() {
        let mut h = History::new(2);
        h.push(vec![1.0]);
        h.push(vec![2.0]);
        h.push(vec![3.0]);
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(0), Some(&[3.0][..]));
        assert_eq!(h.get(1), Some(&[2.0][..]));
        assert_eq!(h.get(2), None);
    }

    #[test]
    fn set_backfills_with_zeros() {
        let mut h = History::new(3);
        h.set(2, vec![5.0, 6.0]);
        assert_eq!(h.len(), 3);
        assert_eq!(h.get(0), Some(&[0.0, 0.0][..]));
        assert_eq!(h.get(2), Some(&[5.0, 6.0][..]));
    }

    #[test]
    fn set_beyond_capacity_is_ignored() {
        let mut h = History::new(1);
        h.set(1, vec![1.0]);
        assert!(h.is_empty());
    }

    #[test]
    fn resize_keeps_newest() {
        let mut h = History::new(3);
        for v in 0..3 {
            h.push(vec![v as f64]);
        }
        h.resize(1);
        assert_eq!(h.get(0), Some(&[2.0][..]));
        assert_eq!(h.len(), 1);
    }
}
