//! Persisted state between ticks.
//!
//! The running process does not survive between ticks, so anything that
//! must be remembered goes through a [`StateStore`]: a plain key-value
//! mapping of byte blobs. Records are encoded with `bincode`; the store
//! itself knows nothing about their contents.
//!
//! Components never reach a global: the [`Colony`](crate::colony::Colony)
//! owns its store and hands each component its decoded record.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ColonyError, Result};

/// Process-wide key-value storage that outlives a tick.
///
/// No transactions. Implementations are assumed to always be available.
pub trait StateStore {
    /// Read the blob stored under `key`.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Replace the blob stored under `key`.
    fn put(&mut self, key: &str, bytes: Vec<u8>);

    /// Delete the blob stored under `key`.
    fn remove(&mut self, key: &str);
}

/// A record type with a fixed home in the store.
pub trait Persisted: Serialize + DeserializeOwned + Default {
    /// Store key of the record.
    const KEY: &'static str;
}

/// Typed access on top of any [`StateStore`].
pub trait StateStoreExt: StateStore {
    /// Decode a record, or its default if it was never written.
    fn load<T: Persisted>(&self) -> Result<T> {
        match self.get(T::KEY) {
            None => Ok(T::default()),
            Some(bytes) => bincode::deserialize(&bytes).map_err(|e| ColonyError::Persistence {
                key: T::KEY.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Decode a record, falling back to its default when the blob is corrupt.
    fn load_or_reset<T: Persisted>(&self) -> T {
        self.load().unwrap_or_else(|err| {
            tracing::warn!(key = T::KEY, error = %err, "Discarding unreadable record");
            T::default()
        })
    }

    /// Encode and write a record.
    fn save<T: Persisted>(&mut self, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| ColonyError::Persistence {
            key: T::KEY.to_string(),
            message: e.to_string(),
        })?;
        self.put(T::KEY, bytes);
        Ok(())
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// In-process [`StateStore`] backed by an ordered map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Total size of all blobs in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Hash of every key and blob, in key order.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.entries.hash(&mut hasher);
        hasher.finish()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), bytes);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}
