//! Route key to owning group index.
//!
//! One index covers both address families; the key's tagged addresses keep
//! IPv4 and IPv6 routes apart.

use super::cache::CacheError;
use super::types::{CachedRouteEntry, RouteKey};
use crate::sync_map::SyncMap;
use ipmc_sai::ReplGroupOid;
use ipmc_types::{AddressFamily, RifId};

#[derive(Debug, Clone, Default)]
pub struct RouteEntryIndex {
    entries: SyncMap<RouteKey, CachedRouteEntry>,
}

impl RouteEntryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_add(&self, key: &RouteKey) -> Result<(), CacheError> {
        if self.entries.contains_key(key) {
            return Err(CacheError::RouteExists(*key));
        }
        Ok(())
    }

    pub fn add(&mut self, entry: CachedRouteEntry) -> Result<(), CacheError> {
        self.entries
            .try_insert(entry.key, entry)
            .map(|_| ())
            .map_err(|_| CacheError::RouteExists(entry.key))
    }

    pub fn remove(&mut self, key: &RouteKey) -> Result<CachedRouteEntry, CacheError> {
        self.entries
            .remove(key)
            .map_err(|_| CacheError::RouteNotFound(*key))
    }

    pub fn get(&self, key: &RouteKey) -> Result<&CachedRouteEntry, CacheError> {
        self.entries.get(key).ok_or(CacheError::RouteNotFound(*key))
    }

    fn get_mut(&mut self, key: &RouteKey) -> Result<&mut CachedRouteEntry, CacheError> {
        self.entries.get_mut(key).ok_or(CacheError::RouteNotFound(*key))
    }

    pub fn group_ref(&self, key: &RouteKey) -> Result<ReplGroupOid, CacheError> {
        self.get(key).map(|entry| entry.repl_group)
    }

    /// Points the route at another group and returns the previous one.
    pub fn update_group_ref(&mut self, key: &RouteKey, group: ReplGroupOid) -> Result<ReplGroupOid, CacheError> {
        let entry = self.get_mut(key)?;
        Ok(std::mem::replace(&mut entry.repl_group, group))
    }

    pub fn update_copy_to_cpu(&mut self, key: &RouteKey, value: bool) -> Result<(), CacheError> {
        self.get_mut(key)?.copy_to_cpu = value;
        Ok(())
    }

    pub fn update_iif(&mut self, key: &RouteKey, rif: RifId) -> Result<(), CacheError> {
        self.get_mut(key)?.iif = rif;
        Ok(())
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedRouteEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn len_family(&self, family: AddressFamily) -> usize {
        self.entries.keys().filter(|key| key.family() == family).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipmc_types::VrfId;
    use pretty_assertions::assert_eq;

    fn group(raw: u64) -> ReplGroupOid {
        ReplGroupOid::from_raw_unchecked(raw)
    }

    fn v4_key() -> RouteKey {
        RouteKey::star_g(VrfId(0), "230.1.1.1".parse().unwrap())
    }

    #[test]
    fn test_add_duplicate_key_leaves_entry() {
        let mut index = RouteEntryIndex::new();
        let entry = CachedRouteEntry::new(v4_key(), RifId(100), group(1)).with_copy_to_cpu(true);
        index.add(entry).unwrap();

        // Different payload, same identity.
        let dup = CachedRouteEntry::new(v4_key(), RifId(300), group(2));
        assert_eq!(index.add(dup), Err(CacheError::RouteExists(v4_key())));
        assert_eq!(*index.get(&v4_key()).unwrap(), entry);
    }

    #[test]
    fn test_updates_change_payload_in_place() {
        let mut index = RouteEntryIndex::new();
        index
            .add(CachedRouteEntry::new(v4_key(), RifId(100), group(1)))
            .unwrap();

        assert_eq!(index.update_group_ref(&v4_key(), group(2)).unwrap(), group(1));
        index.update_copy_to_cpu(&v4_key(), true).unwrap();
        index.update_iif(&v4_key(), RifId(101)).unwrap();

        let entry = index.get(&v4_key()).unwrap();
        assert_eq!(entry.repl_group, group(2));
        assert!(entry.copy_to_cpu);
        assert_eq!(entry.iif, RifId(101));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_missing_key_errors() {
        let mut index = RouteEntryIndex::new();
        let key = v4_key();
        assert_eq!(index.group_ref(&key), Err(CacheError::RouteNotFound(key)));
        assert!(index.update_copy_to_cpu(&key, true).is_err());
        assert!(index.remove(&key).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_family_counts() {
        let mut index = RouteEntryIndex::new();
        index
            .add(CachedRouteEntry::new(v4_key(), RifId(1), group(1)))
            .unwrap();
        let v6 = RouteKey::star_g(VrfId(0), "ff0e::1".parse().unwrap());
        index.add(CachedRouteEntry::new(v6, RifId(1), group(1))).unwrap();

        assert_eq!(index.len_family(AddressFamily::Ipv4), 1);
        assert_eq!(index.len_family(AddressFamily::Ipv6), 1);
    }
}
