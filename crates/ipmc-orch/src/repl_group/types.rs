//! Cached replication-group, member and route types.

use super::members::GroupMemberSet;
use ipmc_sai::types::RawSaiObjectId;
use ipmc_sai::{IpmcGroupOid, ReplGroupOid, ReplGroupOwner, RpfGroupOid};
use ipmc_types::{AddressFamily, IpAddress, IpmcEntryType, PhysicalPort, PortSet, RifId, VrfId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Which side of a replication group a member belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Incoming interface; at most one per group.
    Rpf,
    /// Outgoing interface.
    Ipmc,
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRole::Rpf => write!(f, "rpf"),
            MemberRole::Ipmc => write!(f, "ipmc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberOp {
    Add,
    Delete,
    /// Replace the member's port list.
    Update,
}

/// Caller-supplied member: the RIF it hangs off and its raw port list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSpec {
    pub rif: RifId,
    pub ports: Vec<PhysicalPort>,
}

impl MemberSpec {
    pub fn new(rif: RifId, ports: impl IntoIterator<Item = PhysicalPort>) -> Self {
        Self {
            rif,
            ports: ports.into_iter().collect(),
        }
    }
}

/// A programmed RPF or IPMC group member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub oid: RawSaiObjectId,
    pub rif: RifId,
    /// Normalized port set, for comparison only. Hardware calls always
    /// resolve from the caller's list.
    pub ports: PortSet,
}

impl GroupMember {
    pub fn new(oid: RawSaiObjectId, rif: RifId, ports: &[PhysicalPort]) -> Self {
        Self {
            oid,
            rif,
            ports: ipmc_types::normalize_ports(ports),
        }
    }
}

/// Identity of a multicast route: VRF, entry type, group and source.
///
/// The source is present exactly when the type is `(S,G)`. Payload such as
/// the incoming interface is not part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub vrf: VrfId,
    pub entry_type: IpmcEntryType,
    pub group: IpAddress,
    pub source: Option<IpAddress>,
}

impl RouteKey {
    pub fn star_g(vrf: VrfId, group: IpAddress) -> Self {
        Self {
            vrf,
            entry_type: IpmcEntryType::StarG,
            group,
            source: None,
        }
    }

    pub fn source_g(vrf: VrfId, source: IpAddress, group: IpAddress) -> Self {
        Self {
            vrf,
            entry_type: IpmcEntryType::SourceG,
            group,
            source: Some(source),
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.group.family()
    }

    /// Checks the key is one the hardware can hold.
    pub fn validate(&self) -> Result<(), String> {
        if !self.group.is_multicast() {
            return Err(format!("{} is not a multicast group", self.group));
        }
        match (self.entry_type, self.source) {
            (IpmcEntryType::StarG, None) => Ok(()),
            (IpmcEntryType::StarG, Some(_)) => Err("(*,G) route carries a source".to_string()),
            (IpmcEntryType::SourceG, None) => Err("(S,G) route without a source".to_string()),
            (IpmcEntryType::SourceG, Some(source)) if source.family() != self.group.family() => {
                Err(format!("source {} and group {} differ in family", source, self.group))
            }
            (IpmcEntryType::SourceG, Some(source)) if source.is_multicast() => {
                Err(format!("source {} is a multicast address", source))
            }
            (IpmcEntryType::SourceG, Some(_)) => Ok(()),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(source) => write!(f, "vrf{}:({},{})", self.vrf, source, self.group),
            None => write!(f, "vrf{}:(*,{})", self.vrf, self.group),
        }
    }
}

/// A route as the cache holds it: the key plus mutable payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachedRouteEntry {
    pub key: RouteKey,
    pub iif: RifId,
    pub repl_group: ReplGroupOid,
    pub copy_to_cpu: bool,
}

impl CachedRouteEntry {
    pub fn new(key: RouteKey, iif: RifId, repl_group: ReplGroupOid) -> Self {
        Self {
            key,
            iif,
            repl_group,
            copy_to_cpu: false,
        }
    }

    pub fn with_copy_to_cpu(mut self, copy_to_cpu: bool) -> Self {
        self.copy_to_cpu = copy_to_cpu;
        self
    }
}

/// Changes applied by `update_route`; `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteUpdate {
    pub repl_group: Option<ReplGroupOid>,
    pub copy_to_cpu: Option<bool>,
    pub iif: Option<RifId>,
}

impl RouteUpdate {
    pub fn repl_group(mut self, group: ReplGroupOid) -> Self {
        self.repl_group = Some(group);
        self
    }

    pub fn copy_to_cpu(mut self, value: bool) -> Self {
        self.copy_to_cpu = Some(value);
        self
    }

    pub fn iif(mut self, rif: RifId) -> Self {
        self.iif = Some(rif);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.repl_group.is_none() && self.copy_to_cpu.is_none() && self.iif.is_none()
    }
}

/// A replication group and everything hanging off it.
#[derive(Debug, Clone)]
pub struct ReplicationGroup {
    pub id: ReplGroupOid,
    pub owner: ReplGroupOwner,
    pub rpf_group: RpfGroupOid,
    /// Null until the first outgoing member needs one.
    pub ipmc_group: IpmcGroupOid,
    pub members: GroupMemberSet,
    pub ipv4_entries: HashSet<RouteKey>,
    pub ipv6_entries: HashSet<RouteKey>,
}

impl ReplicationGroup {
    pub fn new(id: ReplGroupOid, owner: ReplGroupOwner, rpf_group: RpfGroupOid, ipmc_group: IpmcGroupOid) -> Self {
        Self {
            id,
            owner,
            rpf_group,
            ipmc_group,
            members: GroupMemberSet::default(),
            ipv4_entries: HashSet::new(),
            ipv6_entries: HashSet::new(),
        }
    }

    /// False once a delete has removed the RPF sub-group but stopped
    /// before the group itself was gone.
    pub fn is_complete(&self) -> bool {
        self.rpf_group.is_valid()
    }

    /// True while any route references the group.
    pub fn is_in_use(&self) -> bool {
        !self.ipv4_entries.is_empty() || !self.ipv6_entries.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.ipv4_entries.len() + self.ipv6_entries.len()
    }

    pub fn entries(&self, family: AddressFamily) -> &HashSet<RouteKey> {
        match family {
            AddressFamily::Ipv4 => &self.ipv4_entries,
            AddressFamily::Ipv6 => &self.ipv6_entries,
        }
    }

    pub(crate) fn entries_mut(&mut self, family: AddressFamily) -> &mut HashSet<RouteKey> {
        match family {
            AddressFamily::Ipv4 => &mut self.ipv4_entries,
            AddressFamily::Ipv6 => &mut self.ipv6_entries,
        }
    }
}
