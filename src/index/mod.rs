//! # In-memory index
//!
//! Maps every live key to its current value.  The index is never persisted:
//! it is rebuilt from scratch by replaying the log on every load, folding
//! records in file order with [`Index::apply`].
//!
//! Tombstones are never stored.  A delete removes the key outright, so the
//! index always describes exactly the live set.
//!
//! Keys are kept in a [`BTreeMap`], so [`Index::values`] yields values in
//! ascending key order.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use crate::record::Record;

/// Live key/value state of the store.
#[derive(Debug, Default, Clone)]
pub struct Index {
    /// Ordered key-value mapping.
    tree: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Sum of key and value lengths of all entries.
    approximate_size: usize,
}

impl Index {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `key`, overwriting any previous value.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let key_len = key.len();
        let value_len = value.len();
        match self.tree.insert(key, value) {
            // Same key: only the value length changes.
            Some(old) => self.approximate_size = self.approximate_size - old.len() + value_len,
            None => self.approximate_size += key_len + value_len,
        }
    }

    /// Removes `key`, returning its previous value. No-op if absent.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let old = self.tree.remove(key)?;
        self.approximate_size -= key.len() + old.len();
        Some(old)
    }

    /// Returns the live value of `key`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.tree.get(key).map(Vec::as_slice)
    }

    /// Returns `true` if `key` is live.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.tree.contains_key(key)
    }

    /// Iterates over all live values.
    pub fn values(&self) -> impl Iterator<Item = &[u8]> {
        self.tree.values().map(Vec::as_slice)
    }

    /// Iterates over all live key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.tree.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Sum of key and value byte lengths of all live entries.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.approximate_size = 0;
    }

    /// Folds one replayed record into the index.
    ///
    /// A live record sets the key, a tombstone removes it.
    pub fn apply(&mut self, record: Record) {
        if record.tombstone {
            self.remove(&record.key);
        } else {
            self.set(record.key, record.value);
        }
    }
}
