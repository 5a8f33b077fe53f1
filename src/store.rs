//! Store Module
//!
//! The in-memory key/value mapping and its operations.
//!
//! The store is a plain single-owner structure with `&mut self` mutators.
//! It has no locking of its own: the dispatcher holds it behind one mutex so
//! each operation runs as an indivisible unit across connections.

use std::collections::HashMap;

use bytes::Bytes;

/// Reply to `PING`
pub const PONG: &str = "PONG";

/// In-memory key/value mapping
#[derive(Debug, Default, Clone)]
pub struct Store {
    entries: HashMap<Bytes, Bytes>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by pre-populated data
    pub fn with_entries(entries: HashMap<Bytes, Bytes>) -> Self {
        Self { entries }
    }

    /// Value for `key`, if present
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.entries.get(key).cloned()
    }

    /// Insert or overwrite
    pub fn set(&mut self, key: Bytes, value: Bytes) {
        self.entries.insert(key, value);
    }

    /// Remove `key`; returns the number of entries removed (0 or 1)
    pub fn delete(&mut self, key: &[u8]) -> i64 {
        i64::from(self.entries.remove(key).is_some())
    }

    /// Insert every pair, in order
    pub fn multi_set<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (Bytes, Bytes)>,
    {
        self.entries.extend(pairs);
    }

    /// Values for `keys`, in request order
    pub fn multi_get<'a, I>(&self, keys: I) -> Vec<Option<Bytes>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        keys.into_iter().map(|key| self.get(key)).collect()
    }

    /// 1 if `key` is present, else 0
    pub fn exists(&self, key: &[u8]) -> i64 {
        i64::from(self.entries.contains_key(key))
    }

    /// Number of `keys` present; repeated keys count every time
    pub fn exists_many<'a, I>(&self, keys: I) -> i64
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        keys.into_iter().map(|key| self.exists(key)).sum()
    }

    /// Length of the stored value, 0 when missing
    pub fn strlen(&self, key: &[u8]) -> i64 {
        self.entries.get(key).map_or(0, |v| v.len() as i64)
    }

    /// Remove everything; returns the prior size
    pub fn flush(&mut self) -> i64 {
        let removed = self.entries.len() as i64;
        self.entries.clear();
        removed
    }

    pub fn echo(&self, value: Bytes) -> Bytes {
        value
    }

    pub fn ping(&self) -> &'static str {
        PONG
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Bytes, Bytes)> for Store {
    fn from_iter<I: IntoIterator<Item = (Bytes, Bytes)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
