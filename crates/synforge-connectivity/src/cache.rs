// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Per-connector memoization keyed by query context.

A connector is queried several times per build, at different granularities,
so cached values are keyed by the context they were computed for rather than
held globally. Entries live in an arena and are only dropped by
[`ConnectorCache::invalidate`].
*/

use ahash::AHashMap;

use crate::population::VertexSlice;
use crate::rng::splitmix64;

/// Opaque identity of a query context (request, slice pair, row, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(u64);

impl ContextKey {
    pub fn from_parts(parts: &[u64]) -> Self {
        let mut hash = 0x5EED_C0DE_u64;
        for &part in parts {
            hash = splitmix64(hash ^ part);
        }
        Self(hash)
    }

    /// Key for a sub-context, such as one row of a selection table
    pub fn child(self, index: u64) -> Self {
        Self::from_parts(&[self.0, index])
    }

    /// Key for a (pre slice, post slice) pair below this context
    pub fn for_slices(self, pre_slice: &VertexSlice, post_slice: &VertexSlice) -> Self {
        Self::from_parts(&[
            self.0,
            u64::from(pre_slice.lo_atom),
            u64::from(pre_slice.hi_atom),
            u64::from(post_slice.lo_atom),
            u64::from(post_slice.hi_atom),
        ])
    }

    /// Key for one post slice below this context
    pub fn for_post_slice(self, post_slice: &VertexSlice) -> Self {
        Self::from_parts(&[
            self.0,
            u64::from(post_slice.lo_atom),
            u64::from(post_slice.hi_atom),
        ])
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Arena of cached values indexed by [`ContextKey`]
#[derive(Debug, Clone)]
pub struct ConnectorCache<V> {
    entries: Vec<V>,
    index: AHashMap<ContextKey, usize>,
}

impl<V> Default for ConnectorCache<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl<V> ConnectorCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: ContextKey) -> Option<&V> {
        self.index.get(&key).map(|&slot| &self.entries[slot])
    }

    pub fn contains(&self, key: ContextKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn get_or_insert_with(&mut self, key: ContextKey, fill: impl FnOnce() -> V) -> &V {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.entries.push(fill());
                let slot = self.entries.len() - 1;
                self.index.insert(key, slot);
                slot
            }
        };
        &self.entries[slot]
    }

    /// Fill on first use; a failed fill leaves the cache untouched
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: ContextKey,
        fill: impl FnOnce() -> Result<V, E>,
    ) -> Result<&V, E> {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let value = fill()?;
                self.entries.push(value);
                let slot = self.entries.len() - 1;
                self.index.insert(key, slot);
                slot
            }
        };
        Ok(&self.entries[slot])
    }

    /// Drop every cached entry before a rebuild
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_once_per_key() {
        let mut cache = ConnectorCache::new();
        let key = ContextKey::from_parts(&[1, 2]);
        let mut fills = 0;
        for _ in 0..3 {
            let value = *cache.get_or_insert_with(key, || {
                fills += 1;
                42
            });
            assert_eq!(value, 42);
        }
        assert_eq!(fills, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_fill_is_not_cached() {
        let mut cache: ConnectorCache<u32> = ConnectorCache::new();
        let key = ContextKey::from_parts(&[9]);
        let result: Result<&u32, &str> = cache.get_or_try_insert_with(key, || Err("nope"));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_clears_entries() {
        let mut cache = ConnectorCache::new();
        cache.get_or_insert_with(ContextKey::from_parts(&[1]), || "a");
        cache.get_or_insert_with(ContextKey::from_parts(&[2]), || "b");
        assert_eq!(cache.len(), 2);
        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.get(ContextKey::from_parts(&[1])).is_none());
    }

    #[test]
    fn test_keys_depend_on_slices() {
        let root = ContextKey::from_parts(&[7]);
        let a = VertexSlice::linear(0, 9).unwrap();
        let b = VertexSlice::linear(10, 19).unwrap();
        assert_ne!(root.for_slices(&a, &b), root.for_slices(&b, &a));
        assert_eq!(root.for_slices(&a, &b), root.for_slices(&a, &b));
    }
}
