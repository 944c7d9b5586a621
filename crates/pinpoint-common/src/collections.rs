// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::CapacityError;

/// Fixed-capacity batch. The backing storage is allocated once and never grows.
#[derive(Debug, Clone)]
pub struct BoundedBatch<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> BoundedBatch<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, handing it back when the batch is full.
    pub fn push(&mut self, item: T) -> Result<(), (T, CapacityError)> {
        if self.items.len() >= self.capacity {
            return Err((
                item,
                CapacityError {
                    capacity: self.capacity,
                },
            ));
        }
        self.items.push(item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Takes every item out, leaving the batch empty with its capacity intact.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<'a, T> IntoIterator for &'a BoundedBatch<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_rejects_at_capacity() {
        let mut batch = BoundedBatch::with_capacity(2);
        assert!(batch.push(1).is_ok());
        assert!(!batch.is_full());
        assert!(batch.push(2).is_ok());
        assert!(batch.is_full());

        let (rejected, error) = batch.push(3).expect_err("batch is full");
        assert_eq!(rejected, 3);
        assert_eq!(error, CapacityError { capacity: 2 });
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        let mut batch = BoundedBatch::with_capacity(0);
        assert!(batch.is_full());
        assert!(batch.push("x").is_err());
    }

    #[test]
    fn test_drain_keeps_capacity() {
        let mut batch = BoundedBatch::with_capacity(3);
        for i in 0..3 {
            batch.push(i).expect("room left");
        }
        assert_eq!(batch.iter().sum::<i32>(), 3);
        assert_eq!(batch.drain(), vec![0, 1, 2]);
        assert!(batch.is_empty());
        assert_eq!(batch.capacity(), 3);
        batch.push(7).expect("room after drain");
        batch.clear();
        assert!(batch.is_empty());
    }
}
