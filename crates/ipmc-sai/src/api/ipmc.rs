//! SAI IPMC object API: replication groups, RPF/IPMC groups, their members
//! and IPMC route entries.
//!
//! Object creation order on hardware is top-level replication group first,
//! then the IPMC and RPF sub-groups that reference it, then members that
//! reference a sub-group. Removal runs in the reverse order.

use crate::error::SaiResult;
use crate::types::{
    BridgePortOid, IpmcGroupKind, IpmcGroupMemberOid, IpmcGroupOid, ReplGroupOid,
    RouterInterfaceOid, RpfGroupKind, RpfGroupMemberOid, RpfGroupOid, SaiObjectId, SaiObjectKind,
    VirtualRouterOid,
};
use ipmc_types::{AddressFamily, DeviceId, IpAddress, IpmcEntryType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application that owns a replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplGroupOwner {
    #[default]
    Ipmc,
    L2mc,
}

/// Route entry packet action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketAction {
    #[default]
    Forward,
    TrapToCpu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplGroupAttribute {
    Owner(ReplGroupOwner),
}

/// Attributes of an RPF or IPMC sub-group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubGroupAttribute {
    /// Top-level replication group the sub-group belongs to.
    ReplGroup(ReplGroupOid),
}

/// Attributes of an RPF or IPMC group member.
///
/// `G` is the kind of the sub-group the member belongs to.
#[derive(Debug, PartialEq, Eq)]
pub enum GroupMemberAttribute<G: SaiObjectKind> {
    Group(SaiObjectId<G>),
    RouterInterface(RouterInterfaceOid),
    /// Resolved bridge ports; settable after creation.
    BridgePorts(Vec<BridgePortOid>),
}

impl<G: SaiObjectKind> Clone for GroupMemberAttribute<G> {
    fn clone(&self) -> Self {
        match self {
            GroupMemberAttribute::Group(oid) => GroupMemberAttribute::Group(*oid),
            GroupMemberAttribute::RouterInterface(rif) => GroupMemberAttribute::RouterInterface(*rif),
            GroupMemberAttribute::BridgePorts(ports) => GroupMemberAttribute::BridgePorts(ports.clone()),
        }
    }
}

pub type IpmcGroupMemberAttribute = GroupMemberAttribute<IpmcGroupKind>;
pub type RpfGroupMemberAttribute = GroupMemberAttribute<RpfGroupKind>;

/// Hardware key of an IPMC route entry (`sai_ipmc_entry_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpmcEntry {
    pub vr_id: VirtualRouterOid,
    pub entry_type: IpmcEntryType,
    pub destination: IpAddress,
    /// Present only for `(S,G)` entries.
    pub source: Option<IpAddress>,
}

impl IpmcEntry {
    pub fn family(&self) -> AddressFamily {
        self.destination.family()
    }
}

impl fmt::Display for IpmcEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(source) => write!(f, "vr:{}/({},{})", self.vr_id, source, self.destination),
            None => write!(f, "vr:{}/(*,{})", self.vr_id, self.destination),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpmcEntryAttrId {
    PacketAction,
    OutputGroup,
    RpfGroup,
    IngressInterface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpmcEntryAttribute {
    PacketAction(PacketAction),
    /// IPMC group to replicate to; null when the group has no outputs.
    OutputGroup(IpmcGroupOid),
    RpfGroup(RpfGroupOid),
    IngressInterface(RouterInterfaceOid),
}

impl IpmcEntryAttribute {
    pub fn id(&self) -> IpmcEntryAttrId {
        match self {
            IpmcEntryAttribute::PacketAction(_) => IpmcEntryAttrId::PacketAction,
            IpmcEntryAttribute::OutputGroup(_) => IpmcEntryAttrId::OutputGroup,
            IpmcEntryAttribute::RpfGroup(_) => IpmcEntryAttrId::RpfGroup,
            IpmcEntryAttribute::IngressInterface(_) => IpmcEntryAttrId::IngressInterface,
        }
    }
}

/// Hardware gateway for IPMC objects.
///
/// Every call is blocking. Implementations must not call back into the
/// orchestration layer.
pub trait IpmcApi: Send + Sync {
    fn create_repl_group(
        &self,
        device: DeviceId,
        attrs: &[ReplGroupAttribute],
    ) -> SaiResult<ReplGroupOid>;

    fn remove_repl_group(&self, device: DeviceId, group: ReplGroupOid) -> SaiResult<()>;

    fn create_ipmc_group(
        &self,
        device: DeviceId,
        attrs: &[SubGroupAttribute],
    ) -> SaiResult<IpmcGroupOid>;

    fn remove_ipmc_group(&self, device: DeviceId, group: IpmcGroupOid) -> SaiResult<()>;

    fn create_rpf_group(&self, device: DeviceId, attrs: &[SubGroupAttribute])
        -> SaiResult<RpfGroupOid>;

    fn remove_rpf_group(&self, device: DeviceId, group: RpfGroupOid) -> SaiResult<()>;

    fn create_ipmc_group_member(
        &self,
        device: DeviceId,
        attrs: &[IpmcGroupMemberAttribute],
    ) -> SaiResult<IpmcGroupMemberOid>;

    fn remove_ipmc_group_member(&self, device: DeviceId, member: IpmcGroupMemberOid)
        -> SaiResult<()>;

    fn set_ipmc_group_member_attribute(
        &self,
        device: DeviceId,
        member: IpmcGroupMemberOid,
        attr: &IpmcGroupMemberAttribute,
    ) -> SaiResult<()>;

    fn create_rpf_group_member(
        &self,
        device: DeviceId,
        attrs: &[RpfGroupMemberAttribute],
    ) -> SaiResult<RpfGroupMemberOid>;

    fn remove_rpf_group_member(&self, device: DeviceId, member: RpfGroupMemberOid)
        -> SaiResult<()>;

    fn set_rpf_group_member_attribute(
        &self,
        device: DeviceId,
        member: RpfGroupMemberOid,
        attr: &RpfGroupMemberAttribute,
    ) -> SaiResult<()>;

    fn create_ipmc_entry(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        attrs: &[IpmcEntryAttribute],
    ) -> SaiResult<()>;

    fn remove_ipmc_entry(&self, device: DeviceId, entry: &IpmcEntry) -> SaiResult<()>;

    fn set_ipmc_entry_attribute(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        attr: &IpmcEntryAttribute,
    ) -> SaiResult<()>;

    fn get_ipmc_entry_attribute(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        ids: &[IpmcEntryAttrId],
    ) -> SaiResult<Vec<IpmcEntryAttribute>>;
}
