//! Transactional view over the persistent key-value store.
//!
//! The host owns the persistent backend and exposes it through the
//! read-only [`StateStore`] interface. During execution [`TxStorage`]
//! buffers every write and delete in memory; on a successful top-level
//! return the host drains the buffer with [`TxStorage::into_writes`] and
//! commits it atomically, on failure it simply drops the whole state.
//!
//! Keys and values are opaque byte strings at this layer; the internal
//! functions own their encoding.

use std::collections::BTreeMap;

/// Read interface to the host's persistent key-value store.
pub trait StateStore {
    /// Retrieves a value by key, returning `None` if the key does not exist.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

/// Write-buffering overlay on top of a base store.
///
/// Reads fall through to the base for keys without a buffered write.
/// `None` in the write map marks a deletion.
pub struct TxStorage<'a> {
    base: &'a dyn StateStore,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> TxStorage<'a> {
    /// Creates a new overlay backed by the given base store.
    pub fn new(base: &'a dyn StateStore) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Reads through the overlay.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(buffered) = self.writes.get(key) {
            return buffered.clone();
        }
        self.base.get(key)
    }

    /// Returns whether the key currently resolves to a value.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Buffers a write.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    /// Buffers a deletion.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.writes.insert(key, None);
    }

    /// Returns the buffered writes for inspection.
    pub fn writes(&self) -> &BTreeMap<Vec<u8>, Option<Vec<u8>>> {
        &self.writes
    }

    /// Consumes the overlay and returns the buffered writes in key order.
    pub fn into_writes(self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.writes.into_iter().collect()
    }
}

/// In-memory store used by tests and the runner binary.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given entries.
    pub fn with_data(data: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            data: data.into_iter().collect(),
        }
    }

    /// Applies a committed write list.
    pub fn apply(&mut self, writes: Vec<(Vec<u8>, Option<Vec<u8>>)>) {
        for (key, value) in writes {
            match value {
                Some(value) => {
                    self.data.insert(key, value);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
    }

    /// Returns the stored entries for inspection.
    pub fn entries(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.data
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }
}
