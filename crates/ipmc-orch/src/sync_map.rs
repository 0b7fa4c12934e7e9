//! Map wrapper that never creates entries implicitly.
//!
//! Every cache table in this crate is a `SyncMap`. Lookups return `Option`
//! and the insert/remove variants that matter to the caches report a
//! missing or duplicate key as an error instead of silently overwriting.
//!
//! ```
//! use ipmc_orch::SyncMap;
//!
//! let mut map: SyncMap<u32, &str> = SyncMap::new();
//! assert!(map.get(&7).is_none());
//! assert!(map.is_empty());
//!
//! map.try_insert(7, "rif7").unwrap();
//! assert!(map.try_insert(7, "again").is_err());
//! assert_eq!(map.get(&7), Some(&"rif7"));
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncMapError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key already exists")]
    KeyExists,
}

#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// **This never creates entries.**
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// **This never creates entries.**
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts only if `key` is absent; an existing value is left untouched.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<&mut V, SyncMapError> {
        match self.inner.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => Err(SyncMapError::KeyExists),
            std::collections::hash_map::Entry::Vacant(slot) => Ok(slot.insert(value)),
        }
    }

    /// Removes `key`, failing if it was never inserted.
    pub fn remove(&mut self, key: &K) -> Result<V, SyncMapError> {
        self.inner.remove(key).ok_or(SyncMapError::KeyNotFound)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }
}

impl<K, V> Default for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
