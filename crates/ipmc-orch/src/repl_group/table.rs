//! Per-device table of replication groups.

use super::cache::CacheError;
use super::types::ReplicationGroup;
use crate::sync_map::SyncMap;
use ipmc_sai::{IpmcGroupOid, ReplGroupOid, ReplGroupOwner, RpfGroupOid};

#[derive(Debug, Clone, Default)]
pub struct ReplGroupTable {
    groups: SyncMap<ReplGroupOid, ReplicationGroup>,
}

impl ReplGroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_create(&self, id: ReplGroupOid) -> Result<(), CacheError> {
        if self.groups.contains_key(&id) {
            return Err(CacheError::GroupExists(id));
        }
        Ok(())
    }

    pub fn create(
        &mut self,
        id: ReplGroupOid,
        owner: ReplGroupOwner,
        rpf_group: RpfGroupOid,
        ipmc_group: IpmcGroupOid,
    ) -> Result<&mut ReplicationGroup, CacheError> {
        self.groups
            .try_insert(id, ReplicationGroup::new(id, owner, rpf_group, ipmc_group))
            .map_err(|_| CacheError::GroupExists(id))
    }

    pub fn get(&self, id: ReplGroupOid) -> Result<&ReplicationGroup, CacheError> {
        self.groups.get(&id).ok_or(CacheError::GroupNotFound(id))
    }

    pub fn get_mut(&mut self, id: ReplGroupOid) -> Result<&mut ReplicationGroup, CacheError> {
        self.groups.get_mut(&id).ok_or(CacheError::GroupNotFound(id))
    }

    pub fn contains(&self, id: ReplGroupOid) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn is_in_use(&self, id: ReplGroupOid) -> Result<bool, CacheError> {
        self.get(id).map(ReplicationGroup::is_in_use)
    }

    /// Removes a group. Routes must have been moved off it first.
    pub fn delete(&mut self, id: ReplGroupOid) -> Result<ReplicationGroup, CacheError> {
        let group = self.get(id)?;
        if group.is_in_use() {
            return Err(CacheError::GroupInUse {
                group: id,
                routes: group.entry_count(),
            });
        }
        self.groups.remove(&id).map_err(|_| CacheError::GroupNotFound(id))
    }

    /// Group ids in ascending order.
    pub fn group_ids(&self) -> Vec<ReplGroupOid> {
        let mut ids: Vec<_> = self.groups.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn groups(&self) -> impl Iterator<Item = &ReplicationGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl_group::types::RouteKey;
    use ipmc_types::VrfId;

    fn oid(raw: u64) -> ReplGroupOid {
        ReplGroupOid::from_raw_unchecked(raw)
    }

    fn create(table: &mut ReplGroupTable, raw: u64) {
        table
            .create(oid(raw), ReplGroupOwner::Ipmc, RpfGroupOid::from_raw_unchecked(raw + 1), IpmcGroupOid::NULL)
            .unwrap();
    }

    #[test]
    fn test_create_rejects_duplicate() {
        let mut table = ReplGroupTable::new();
        create(&mut table, 1);

        assert_eq!(table.check_create(oid(1)), Err(CacheError::GroupExists(oid(1))));
        let err = table
            .create(oid(1), ReplGroupOwner::L2mc, RpfGroupOid::NULL, IpmcGroupOid::NULL)
            .unwrap_err();
        assert_eq!(err, CacheError::GroupExists(oid(1)));
        assert_eq!(table.get(oid(1)).unwrap().owner, ReplGroupOwner::Ipmc);
    }

    #[test]
    fn test_get_missing_group() {
        let table = ReplGroupTable::new();
        assert_eq!(table.get(oid(9)).unwrap_err(), CacheError::GroupNotFound(oid(9)));
        assert!(table.is_in_use(oid(9)).is_err());
    }

    #[test]
    fn test_delete_refuses_group_in_use() {
        let mut table = ReplGroupTable::new();
        create(&mut table, 1);
        let key = RouteKey::star_g(VrfId(0), "230.1.1.1".parse().unwrap());
        table.get_mut(oid(1)).unwrap().ipv4_entries.insert(key);

        assert!(table.is_in_use(oid(1)).unwrap());
        assert!(matches!(table.delete(oid(1)), Err(CacheError::GroupInUse { routes: 1, .. })));

        table.get_mut(oid(1)).unwrap().ipv4_entries.clear();
        assert!(table.delete(oid(1)).is_ok());
        assert!(table.delete(oid(1)).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_group_ids_sorted() {
        let mut table = ReplGroupTable::new();
        for raw in [30, 10, 20] {
            create(&mut table, raw);
        }
        assert_eq!(table.group_ids(), vec![oid(10), oid(20), oid(30)]);
        assert_eq!(table.len(), 3);
    }
}
