//! RPF and IPMC member collections of one replication group.

use super::cache::CacheError;
use super::types::{GroupMember, MemberRole};
use crate::sync_map::SyncMap;
use ipmc_sai::types::RawSaiObjectId;
use ipmc_types::{PortSet, RifId};

/// Members keyed by RIF, one map per role.
///
/// The RPF map never holds more than one member.
#[derive(Debug, Clone, Default)]
pub struct GroupMemberSet {
    rpf: SyncMap<RifId, GroupMember>,
    ipmc: SyncMap<RifId, GroupMember>,
}

impl GroupMemberSet {
    fn map(&self, role: MemberRole) -> &SyncMap<RifId, GroupMember> {
        match role {
            MemberRole::Rpf => &self.rpf,
            MemberRole::Ipmc => &self.ipmc,
        }
    }

    fn map_mut(&mut self, role: MemberRole) -> &mut SyncMap<RifId, GroupMember> {
        match role {
            MemberRole::Rpf => &mut self.rpf,
            MemberRole::Ipmc => &mut self.ipmc,
        }
    }

    /// Validates an [`add`](Self::add) without touching the set.
    pub fn check_add(&self, role: MemberRole, rif: RifId) -> Result<(), CacheError> {
        if self.map(role).contains_key(&rif) {
            return Err(CacheError::MemberExists { role, rif });
        }
        if role == MemberRole::Rpf {
            if let Some(existing) = self.rpf.keys().next() {
                return Err(CacheError::RpfMemberExists { existing: *existing });
            }
        }
        Ok(())
    }

    pub fn add(&mut self, role: MemberRole, member: GroupMember) -> Result<(), CacheError> {
        self.check_add(role, member.rif)?;
        let rif = member.rif;
        self.map_mut(role)
            .try_insert(rif, member)
            .map(|_| ())
            .map_err(|_| CacheError::MemberExists { role, rif })
    }

    pub fn remove(&mut self, role: MemberRole, rif: RifId) -> Result<GroupMember, CacheError> {
        self.map_mut(role)
            .remove(&rif)
            .map_err(|_| CacheError::MemberNotFound { role, rif })
    }

    /// Replaces the cached port set of an existing member.
    pub fn update_ports(&mut self, role: MemberRole, rif: RifId, ports: PortSet) -> Result<(), CacheError> {
        let member = self
            .map_mut(role)
            .get_mut(&rif)
            .ok_or(CacheError::MemberNotFound { role, rif })?;
        member.ports = ports;
        Ok(())
    }

    pub fn get(&self, role: MemberRole, rif: RifId) -> Result<&GroupMember, CacheError> {
        self.map(role)
            .get(&rif)
            .ok_or(CacheError::MemberNotFound { role, rif })
    }

    pub fn handle(&self, role: MemberRole, rif: RifId) -> Result<RawSaiObjectId, CacheError> {
        self.get(role, rif).map(|member| member.oid)
    }

    pub fn contains(&self, role: MemberRole, rif: RifId) -> bool {
        self.map(role).contains_key(&rif)
    }

    /// Members of `role`, ordered by RIF.
    pub fn list(&self, role: MemberRole) -> Vec<&GroupMember> {
        let mut members: Vec<_> = self.map(role).values().collect();
        members.sort_by_key(|member| member.rif);
        members
    }

    pub fn rpf_member(&self) -> Option<&GroupMember> {
        self.rpf.values().next()
    }

    pub fn len(&self, role: MemberRole) -> usize {
        self.map(role).len()
    }

    pub fn is_empty(&self) -> bool {
        self.rpf.is_empty() && self.ipmc.is_empty()
    }
}
