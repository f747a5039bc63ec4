//! Key-value storage for the engine's in-memory state.
//!
//! The quota tracker keeps its per-user entries behind [`KeyValueStore`] so
//! the engine owns an explicit context object rather than process-wide maps,
//! and tests can substitute their own store.

use dashmap::DashMap;
use std::hash::Hash;

/// Minimal get/set/delete store.
pub trait KeyValueStore<K, V>: Send + Sync {
    /// Returns a copy of the value stored under `key`.
    fn get(&self, key: &K) -> Option<V>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: K, value: V);
    /// Removes and returns the value stored under `key`.
    fn delete(&self, key: &K) -> Option<V>;
    /// Returns every key currently stored.
    fn keys(&self) -> Vec<K>;
}

/// In-memory [`KeyValueStore`] backed by a `DashMap`.
#[derive(Debug)]
pub struct MemoryStore<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, V>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyValueStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    fn delete(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(_, value)| value)
    }

    fn keys(&self) -> Vec<K> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }
}
