//! Keyed storage used by the session and room registries.
//!
//! Registries never touch a concrete map directly. They hold an
//! `Arc<dyn KeyedStore<K, V>>`, so the in-memory default can be swapped for
//! another backend without changing any registry or controller code.

use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;

/// Minimal get/set/delete interface over a keyed table.
///
/// Implementations must be safe to call concurrently. Individual calls are
/// atomic; callers that need several calls to appear as one step serialize
/// them themselves (see the registries' module docs).
pub trait KeyedStore<K, V>: Send + Sync + fmt::Debug {
    /// Returns a clone of the value stored under `key`.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores `value` under `key`, returning the previous value if any.
    fn set(&self, key: K, value: V) -> Option<V>;

    /// Removes and returns the value stored under `key`.
    fn delete(&self, key: &K) -> Option<V>;

    /// Whether a value is stored under `key`.
    fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of every entry.
    fn entries(&self) -> Vec<(K, V)>;
}

/// In-memory [`KeyedStore`] backed by a sharded concurrent map.
pub struct MemoryStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, V>,
}

impl<K: Eq + Hash, V> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for MemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<K, V> KeyedStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    fn delete(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store: MemoryStore<String, u32> = MemoryStore::new();
        assert!(store.is_empty());

        assert_eq!(store.set("a".to_string(), 1), None);
        assert_eq!(store.set("a".to_string(), 2), Some(1));
        assert_eq!(store.get(&"a".to_string()), Some(2));
        assert!(store.contains(&"a".to_string()));
        assert_eq!(store.len(), 1);

        assert_eq!(store.delete(&"a".to_string()), Some(2));
        assert_eq!(store.delete(&"a".to_string()), None);
        assert!(store.get(&"a".to_string()).is_none());
    }

    #[test]
    fn test_entries_snapshot() {
        let store: MemoryStore<u32, &'static str> = MemoryStore::new();
        store.set(1, "one");
        store.set(2, "two");

        let mut entries = store.entries();
        entries.sort();
        assert_eq!(entries, vec![(1, "one"), (2, "two")]);
    }

    #[test]
    fn test_usable_as_trait_object() {
        let store: std::sync::Arc<dyn KeyedStore<u32, u32>> =
            std::sync::Arc::new(MemoryStore::new());
        store.set(7, 49);
        assert_eq!(store.get(&7), Some(49));
    }
}
