//! The ordered group of operations flushed to one commit invocation.

use std::fmt;
use std::slice;

use crate::error::BatchError;
use crate::operation::Operation;

/// Operations flushed together, in submission order.
///
/// Members are shared handles: resolving one here resolves it for its waiter.
pub struct Operations<T, R> {
    ops: Vec<Operation<T, R>>,
}

impl<T, R> Operations<T, R> {
    #[must_use]
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, op: Operation<T, R>) {
        self.ops.push(op);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Operation<T, R>> {
        self.ops.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Operation<T, R>> {
        self.ops.iter()
    }

    /// Submitted values in order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.ops.iter().map(Operation::value)
    }

    /// Members that nobody has resolved yet.
    pub fn unresolved(&self) -> impl Iterator<Item = &Operation<T, R>> {
        self.ops.iter().filter(|op| !op.is_resolved())
    }

    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.unresolved().count()
    }

    /// Resolves every still-unresolved member with `err`, returning how many
    /// were resolved by this call.
    pub fn resolve_remaining(&self, err: &BatchError) -> usize {
        self.unresolved()
            .filter(|op| op.resolve_err(err.clone()))
            .count()
    }

    /// Resolves every still-unresolved member with the outcome `f` computes
    /// from its value.
    pub fn resolve_each<F>(&self, mut f: F)
    where
        F: FnMut(&T) -> Result<R, BatchError>,
    {
        for op in self.unresolved() {
            match f(op.value()) {
                Ok(result) => op.resolve(result),
                Err(err) => op.resolve_err(err),
            };
        }
    }

    /// Splits off everything past the first `at` members into a new group.
    #[must_use]
    pub fn split_off(&mut self, at: usize) -> Self {
        Self {
            ops: self.ops.split_off(at.min(self.ops.len())),
        }
    }
}

impl<T, R> Default for Operations<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> Clone for Operations<T, R> {
    fn clone(&self) -> Self {
        Self {
            ops: self.ops.clone(),
        }
    }
}

impl<T: fmt::Debug, R> fmt::Debug for Operations<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ops.iter()).finish()
    }
}

impl<T, R> From<Vec<Operation<T, R>>> for Operations<T, R> {
    fn from(ops: Vec<Operation<T, R>>) -> Self {
        Self { ops }
    }
}

impl<T, R> FromIterator<Operation<T, R>> for Operations<T, R> {
    fn from_iter<I: IntoIterator<Item = Operation<T, R>>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl<'a, T, R> IntoIterator for &'a Operations<T, R> {
    type Item = &'a Operation<T, R>;
    type IntoIter = slice::Iter<'a, Operation<T, R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl<T, R> IntoIterator for Operations<T, R> {
    type Item = Operation<T, R>;
    type IntoIter = std::vec::IntoIter<Operation<T, R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn group(values: &[u32]) -> Operations<u32, u32> {
        values.iter().copied().map(Operation::new).collect()
    }

    #[test]
    fn resolve_remaining_skips_resolved_members() {
        let ops = group(&[1, 2, 3]);
        ops.get(1).unwrap().resolve(20);

        assert_eq!(ops.unresolved_count(), 2);
        assert_eq!(ops.resolve_remaining(&BatchError::Canceled), 2);
        assert_eq!(ops.unresolved_count(), 0);
        assert_eq!(ops.get(1).unwrap().outcome().unwrap().unwrap(), 20);
        assert!(matches!(
            ops.get(0).unwrap().outcome(),
            Some(Err(BatchError::Canceled))
        ));
    }

    #[test]
    fn resolve_each_maps_values() {
        let ops = group(&[1, 2, 3]);
        ops.resolve_each(|v| {
            if *v == 2 {
                Err(BatchError::commit(anyhow::anyhow!("even")))
            } else {
                Ok(v * 10)
            }
        });

        let outcomes: Vec<_> = ops.iter().map(|op| op.outcome().unwrap().ok()).collect();
        assert_eq!(outcomes, vec![Some(10), None, Some(30)]);
    }

    #[test]
    fn clone_shares_members() {
        let ops = group(&[1]);
        let copy = ops.clone();
        copy.get(0).unwrap().resolve(9);
        assert!(ops.get(0).unwrap().is_resolved());
    }

    proptest! {
        #[test]
        fn values_keep_push_order(values in proptest::collection::vec(any::<u32>(), 0..64)) {
            let mut ops = Operations::<u32, ()>::new();
            for v in &values {
                ops.push(Operation::new(*v));
            }
            prop_assert_eq!(ops.len(), values.len());
            prop_assert_eq!(ops.values().copied().collect::<Vec<_>>(), values);
        }

        #[test]
        fn split_off_partitions_in_order(
            values in proptest::collection::vec(any::<u32>(), 0..64),
            at in 0usize..80,
        ) {
            let mut head: Operations<u32, ()> = values.iter().copied().map(Operation::new).collect();
            let tail = head.split_off(at);
            let mut joined: Vec<u32> = head.values().copied().collect();
            joined.extend(tail.values().copied());
            prop_assert_eq!(joined, values.clone());
            prop_assert_eq!(head.len(), at.min(values.len()));
        }
    }
}
