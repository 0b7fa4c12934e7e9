//! In-memory simulated SAI for the IPMC object model.
//!
//! `SimSai` implements [`IpmcApi`] and [`PortResolver`] without hardware.
//! It enforces the same referential rules a real switch does (members need
//! an existing sub-group, a group with dependents cannot be removed) and
//! supports fault injection so rollback paths can be exercised.
//!
//! # Example
//!
//! ```
//! use ipmc_sai::sim::{SimOp, SimSai};
//! use ipmc_sai::{IpmcApi, ReplGroupAttribute, ReplGroupOwner, SaiStatus};
//! use ipmc_types::DeviceId;
//!
//! let sai = SimSai::new();
//! sai.fail_next(SimOp::CreateReplGroup, SaiStatus::TableFull);
//!
//! let attrs = [ReplGroupAttribute::Owner(ReplGroupOwner::Ipmc)];
//! assert!(sai.create_repl_group(DeviceId::new(0), &attrs).is_err());
//! assert!(sai.create_repl_group(DeviceId::new(0), &attrs).is_ok());
//! ```

use crate::api::ipmc::{
    GroupMemberAttribute, IpmcApi, IpmcEntry, IpmcEntryAttrId, IpmcEntryAttribute,
    IpmcGroupMemberAttribute, PacketAction, ReplGroupAttribute, ReplGroupOwner,
    RpfGroupMemberAttribute, SubGroupAttribute,
};
use crate::api::resolver::PortResolver;
use crate::error::{SaiError, SaiResult, SaiStatus};
use crate::types::{
    BridgePortOid, IpmcGroupMemberOid, IpmcGroupOid, RawSaiObjectId, ReplGroupOid,
    RouterInterfaceOid, RpfGroupMemberOid, RpfGroupOid, SaiObjectKind, VirtualRouterOid,
};
use ipmc_types::{DeviceId, PhysicalPort, RifId, VrfId};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Kinds of objects the simulator allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimObjectKind {
    ReplGroup,
    IpmcGroup,
    RpfGroup,
    IpmcGroupMember,
    RpfGroupMember,
    BridgePort,
    RouterInterface,
    VirtualRouter,
}

impl SimObjectKind {
    // Object type lives in the upper bits, like a real sai_object_id_t.
    fn tag(&self) -> u64 {
        let object_type: u64 = match self {
            SimObjectKind::VirtualRouter => 0x03,
            SimObjectKind::RouterInterface => 0x06,
            SimObjectKind::BridgePort => 0x3a,
            SimObjectKind::IpmcGroup => 0x2a,
            SimObjectKind::IpmcGroupMember => 0x2b,
            SimObjectKind::RpfGroup => 0x2c,
            SimObjectKind::RpfGroupMember => 0x2d,
            SimObjectKind::ReplGroup => 0x4f,
        };
        object_type << 48
    }
}

/// Gateway operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    CreateReplGroup,
    RemoveReplGroup,
    CreateIpmcGroup,
    RemoveIpmcGroup,
    CreateRpfGroup,
    RemoveRpfGroup,
    CreateIpmcGroupMember,
    RemoveIpmcGroupMember,
    SetIpmcGroupMember,
    CreateRpfGroupMember,
    RemoveRpfGroupMember,
    SetRpfGroupMember,
    CreateIpmcEntry,
    RemoveIpmcEntry,
    SetIpmcEntry,
    GetIpmcEntry,
}

#[derive(Debug, Clone)]
struct SimObject {
    device: DeviceId,
    kind: SimObjectKind,
    parent: Option<RawSaiObjectId>,
    bridge_ports: Vec<BridgePortOid>,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    op: SimOp,
    skip: u32,
    status: SaiStatus,
}

#[derive(Debug, Default)]
struct SimState {
    next_index: u64,
    objects: HashMap<RawSaiObjectId, SimObject>,
    entries: HashMap<(DeviceId, IpmcEntry), Vec<IpmcEntryAttribute>>,
    bridge_ports: HashMap<(DeviceId, PhysicalPort), BridgePortOid>,
    router_interfaces: HashMap<(DeviceId, RifId), RouterInterfaceOid>,
    virtual_routers: HashMap<(DeviceId, VrfId), VirtualRouterOid>,
    faults: Vec<Fault>,
    calls: Vec<SimOp>,
}

impl SimState {
    fn allocate(&mut self, kind: SimObjectKind) -> RawSaiObjectId {
        self.next_index += 1;
        kind.tag() | self.next_index
    }

    /// Records the call and consumes a matching fault, if one is due.
    fn check(&mut self, op: SimOp) -> SaiResult<()> {
        self.calls.push(op);
        let Some(pos) = self.faults.iter().position(|f| f.op == op) else {
            return Ok(());
        };
        if self.faults[pos].skip > 0 {
            self.faults[pos].skip -= 1;
            return Ok(());
        }
        let fault = self.faults.remove(pos);
        debug!("SimSai: injected {} on {:?}", fault.status, op);
        Err(SaiError::from_status(fault.status))
    }

    fn insert(
        &mut self,
        device: DeviceId,
        kind: SimObjectKind,
        parent: Option<RawSaiObjectId>,
        bridge_ports: Vec<BridgePortOid>,
    ) -> RawSaiObjectId {
        let oid = self.allocate(kind);
        self.objects.insert(
            oid,
            SimObject {
                device,
                kind,
                parent,
                bridge_ports,
            },
        );
        oid
    }

    fn expect_object(&self, device: DeviceId, oid: RawSaiObjectId, kind: SimObjectKind) -> SaiResult<()> {
        match self.objects.get(&oid) {
            Some(obj) if obj.device == device && obj.kind == kind => Ok(()),
            Some(_) => Err(SaiError::invalid_parameter(format!(
                "0x{:016x} is not a {:?} on device {}",
                oid, kind, device
            ))),
            None => Err(SaiError::not_found(format!("{:?} 0x{:016x}", kind, oid))),
        }
    }

    fn remove(&mut self, device: DeviceId, oid: RawSaiObjectId, kind: SimObjectKind) -> SaiResult<()> {
        self.expect_object(device, oid, kind)?;
        if self.objects.values().any(|obj| obj.parent == Some(oid)) {
            return Err(SaiError::object_in_use(format!("{:?} 0x{:016x}", kind, oid)));
        }
        let referenced = self.entries.values().flatten().any(|attr| match attr {
            IpmcEntryAttribute::OutputGroup(group) => group.as_raw() == oid,
            IpmcEntryAttribute::RpfGroup(group) => group.as_raw() == oid,
            _ => false,
        });
        if referenced {
            return Err(SaiError::object_in_use(format!("{:?} 0x{:016x} referenced by route", kind, oid)));
        }
        self.objects.remove(&oid);
        Ok(())
    }

    fn create_sub_group(
        &mut self,
        device: DeviceId,
        kind: SimObjectKind,
        attrs: &[SubGroupAttribute],
    ) -> SaiResult<RawSaiObjectId> {
        let parent = attrs
            .iter()
            .map(|SubGroupAttribute::ReplGroup(group)| group.as_raw())
            .next()
            .ok_or_else(|| SaiError::invalid_parameter("missing replication group attribute"))?;
        self.expect_object(device, parent, SimObjectKind::ReplGroup)?;
        Ok(self.insert(device, kind, Some(parent), Vec::new()))
    }

    fn create_member<G: SaiObjectKind>(
        &mut self,
        device: DeviceId,
        kind: SimObjectKind,
        group_kind: SimObjectKind,
        attrs: &[GroupMemberAttribute<G>],
    ) -> SaiResult<RawSaiObjectId> {
        let mut group = None;
        let mut bridge_ports = Vec::new();
        for attr in attrs {
            match attr {
                GroupMemberAttribute::Group(oid) => group = Some(oid.as_raw()),
                GroupMemberAttribute::RouterInterface(_) => {}
                GroupMemberAttribute::BridgePorts(ports) => bridge_ports = ports.clone(),
            }
        }
        let group = group.ok_or_else(|| SaiError::invalid_parameter("missing group attribute"))?;
        self.expect_object(device, group, group_kind)?;
        Ok(self.insert(device, kind, Some(group), bridge_ports))
    }

    fn set_member<G: SaiObjectKind>(
        &mut self,
        device: DeviceId,
        oid: RawSaiObjectId,
        kind: SimObjectKind,
        attr: &GroupMemberAttribute<G>,
    ) -> SaiResult<()> {
        self.expect_object(device, oid, kind)?;
        let GroupMemberAttribute::BridgePorts(ports) = attr else {
            return Err(SaiError::invalid_parameter("only the bridge port list is settable"));
        };
        if let Some(obj) = self.objects.get_mut(&oid) {
            obj.bridge_ports = ports.clone();
        }
        Ok(())
    }

    fn validate_entry_attr(&self, device: DeviceId, attr: &IpmcEntryAttribute) -> SaiResult<()> {
        match attr {
            IpmcEntryAttribute::OutputGroup(group) if group.is_valid() => {
                self.expect_object(device, group.as_raw(), SimObjectKind::IpmcGroup)
            }
            IpmcEntryAttribute::RpfGroup(group) if group.is_valid() => {
                self.expect_object(device, group.as_raw(), SimObjectKind::RpfGroup)
            }
            _ => Ok(()),
        }
    }
}

/// Simulated SAI switch shared by any number of devices.
#[derive(Debug, Default)]
pub struct SimSai {
    state: Mutex<SimState>,
}

impl SimSai {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bridge_port(&self, device: DeviceId, port: PhysicalPort) -> BridgePortOid {
        let mut state = self.state.lock();
        let oid = BridgePortOid::from_raw_unchecked(state.allocate(SimObjectKind::BridgePort));
        state.bridge_ports.insert((device, port), oid);
        oid
    }

    pub fn add_router_interface(&self, device: DeviceId, rif: RifId) -> RouterInterfaceOid {
        let mut state = self.state.lock();
        let oid = RouterInterfaceOid::from_raw_unchecked(state.allocate(SimObjectKind::RouterInterface));
        state.router_interfaces.insert((device, rif), oid);
        oid
    }

    pub fn add_virtual_router(&self, device: DeviceId, vrf: VrfId) -> VirtualRouterOid {
        let mut state = self.state.lock();
        let oid = VirtualRouterOid::from_raw_unchecked(state.allocate(SimObjectKind::VirtualRouter));
        state.virtual_routers.insert((device, vrf), oid);
        oid
    }

    /// Fails the next call of `op` with `status`.
    pub fn fail_next(&self, op: SimOp, status: SaiStatus) {
        self.fail_nth(op, 1, status);
    }

    /// Fails the `nth` upcoming call of `op` (1-based) with `status`.
    pub fn fail_nth(&self, op: SimOp, nth: u32, status: SaiStatus) {
        self.state.lock().faults.push(Fault {
            op,
            skip: nth.saturating_sub(1),
            status,
        });
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Gateway calls seen so far, in order.
    pub fn calls(&self) -> Vec<SimOp> {
        self.state.lock().calls.clone()
    }

    pub fn object_count(&self, kind: SimObjectKind) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|obj| obj.kind == kind)
            .count()
    }

    /// Number of IPMC objects (groups and members) held for a device.
    pub fn device_object_count(&self, device: DeviceId) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|obj| obj.device == device)
            .count()
    }

    pub fn contains(&self, oid: RawSaiObjectId) -> bool {
        self.state.lock().objects.contains_key(&oid)
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn entry_attributes(&self, device: DeviceId, entry: &IpmcEntry) -> Option<Vec<IpmcEntryAttribute>> {
        self.state.lock().entries.get(&(device, *entry)).cloned()
    }

    pub fn member_bridge_ports(&self, member: RawSaiObjectId) -> Option<Vec<BridgePortOid>> {
        self.state
            .lock()
            .objects
            .get(&member)
            .map(|obj| obj.bridge_ports.clone())
    }

    /// Overwrites an entry attribute behind the orchestrator's back.
    pub fn force_entry_attribute(&self, device: DeviceId, entry: &IpmcEntry, attr: IpmcEntryAttribute) {
        if let Some(attrs) = self.state.lock().entries.get_mut(&(device, *entry)) {
            attrs.retain(|a| a.id() != attr.id());
            attrs.push(attr);
        }
    }
}

impl IpmcApi for SimSai {
    fn create_repl_group(&self, device: DeviceId, attrs: &[ReplGroupAttribute]) -> SaiResult<ReplGroupOid> {
        let mut state = self.state.lock();
        state.check(SimOp::CreateReplGroup)?;
        let owner = attrs
            .iter()
            .map(|ReplGroupAttribute::Owner(owner)| *owner)
            .next()
            .unwrap_or(ReplGroupOwner::Ipmc);
        let oid = state.insert(device, SimObjectKind::ReplGroup, None, Vec::new());
        debug!("SimSai: created {:?} repl group 0x{:016x}", owner, oid);
        Ok(ReplGroupOid::from_raw_unchecked(oid))
    }

    fn remove_repl_group(&self, device: DeviceId, group: ReplGroupOid) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::RemoveReplGroup)?;
        state.remove(device, group.as_raw(), SimObjectKind::ReplGroup)
    }

    fn create_ipmc_group(&self, device: DeviceId, attrs: &[SubGroupAttribute]) -> SaiResult<IpmcGroupOid> {
        let mut state = self.state.lock();
        state.check(SimOp::CreateIpmcGroup)?;
        state
            .create_sub_group(device, SimObjectKind::IpmcGroup, attrs)
            .map(IpmcGroupOid::from_raw_unchecked)
    }

    fn remove_ipmc_group(&self, device: DeviceId, group: IpmcGroupOid) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::RemoveIpmcGroup)?;
        state.remove(device, group.as_raw(), SimObjectKind::IpmcGroup)
    }

    fn create_rpf_group(&self, device: DeviceId, attrs: &[SubGroupAttribute]) -> SaiResult<RpfGroupOid> {
        let mut state = self.state.lock();
        state.check(SimOp::CreateRpfGroup)?;
        state
            .create_sub_group(device, SimObjectKind::RpfGroup, attrs)
            .map(RpfGroupOid::from_raw_unchecked)
    }

    fn remove_rpf_group(&self, device: DeviceId, group: RpfGroupOid) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::RemoveRpfGroup)?;
        state.remove(device, group.as_raw(), SimObjectKind::RpfGroup)
    }

    fn create_ipmc_group_member(
        &self,
        device: DeviceId,
        attrs: &[IpmcGroupMemberAttribute],
    ) -> SaiResult<IpmcGroupMemberOid> {
        let mut state = self.state.lock();
        state.check(SimOp::CreateIpmcGroupMember)?;
        state
            .create_member(device, SimObjectKind::IpmcGroupMember, SimObjectKind::IpmcGroup, attrs)
            .map(IpmcGroupMemberOid::from_raw_unchecked)
    }

    fn remove_ipmc_group_member(&self, device: DeviceId, member: IpmcGroupMemberOid) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::RemoveIpmcGroupMember)?;
        state.remove(device, member.as_raw(), SimObjectKind::IpmcGroupMember)
    }

    fn set_ipmc_group_member_attribute(
        &self,
        device: DeviceId,
        member: IpmcGroupMemberOid,
        attr: &IpmcGroupMemberAttribute,
    ) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::SetIpmcGroupMember)?;
        state.set_member(device, member.as_raw(), SimObjectKind::IpmcGroupMember, attr)
    }

    fn create_rpf_group_member(
        &self,
        device: DeviceId,
        attrs: &[RpfGroupMemberAttribute],
    ) -> SaiResult<RpfGroupMemberOid> {
        let mut state = self.state.lock();
        state.check(SimOp::CreateRpfGroupMember)?;
        state
            .create_member(device, SimObjectKind::RpfGroupMember, SimObjectKind::RpfGroup, attrs)
            .map(RpfGroupMemberOid::from_raw_unchecked)
    }

    fn remove_rpf_group_member(&self, device: DeviceId, member: RpfGroupMemberOid) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::RemoveRpfGroupMember)?;
        state.remove(device, member.as_raw(), SimObjectKind::RpfGroupMember)
    }

    fn set_rpf_group_member_attribute(
        &self,
        device: DeviceId,
        member: RpfGroupMemberOid,
        attr: &RpfGroupMemberAttribute,
    ) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::SetRpfGroupMember)?;
        state.set_member(device, member.as_raw(), SimObjectKind::RpfGroupMember, attr)
    }

    fn create_ipmc_entry(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        attrs: &[IpmcEntryAttribute],
    ) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::CreateIpmcEntry)?;
        if entry.entry_type.has_source() != entry.source.is_some() {
            return Err(SaiError::invalid_parameter(format!("source does not match type for {}", entry)));
        }
        if state.entries.contains_key(&(device, *entry)) {
            return Err(SaiError::already_exists(entry.to_string()));
        }
        for attr in attrs {
            state.validate_entry_attr(device, attr)?;
        }
        state.entries.insert((device, *entry), attrs.to_vec());
        Ok(())
    }

    fn remove_ipmc_entry(&self, device: DeviceId, entry: &IpmcEntry) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::RemoveIpmcEntry)?;
        state
            .entries
            .remove(&(device, *entry))
            .map(|_| ())
            .ok_or_else(|| SaiError::not_found(entry.to_string()))
    }

    fn set_ipmc_entry_attribute(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        attr: &IpmcEntryAttribute,
    ) -> SaiResult<()> {
        let mut state = self.state.lock();
        state.check(SimOp::SetIpmcEntry)?;
        state.validate_entry_attr(device, attr)?;
        let attrs = state
            .entries
            .get_mut(&(device, *entry))
            .ok_or_else(|| SaiError::not_found(entry.to_string()))?;
        attrs.retain(|a| a.id() != attr.id());
        attrs.push(*attr);
        Ok(())
    }

    fn get_ipmc_entry_attribute(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        ids: &[IpmcEntryAttrId],
    ) -> SaiResult<Vec<IpmcEntryAttribute>> {
        let mut state = self.state.lock();
        state.check(SimOp::GetIpmcEntry)?;
        let attrs = state
            .entries
            .get(&(device, *entry))
            .ok_or_else(|| SaiError::not_found(entry.to_string()))?;
        Ok(ids
            .iter()
            .map(|id| {
                attrs.iter().find(|a| a.id() == *id).copied().unwrap_or(match id {
                    IpmcEntryAttrId::PacketAction => IpmcEntryAttribute::PacketAction(PacketAction::Forward),
                    IpmcEntryAttrId::OutputGroup => IpmcEntryAttribute::OutputGroup(IpmcGroupOid::NULL),
                    IpmcEntryAttrId::RpfGroup => IpmcEntryAttribute::RpfGroup(RpfGroupOid::NULL),
                    IpmcEntryAttrId::IngressInterface => {
                        IpmcEntryAttribute::IngressInterface(RouterInterfaceOid::NULL)
                    }
                })
            })
            .collect())
    }
}

impl PortResolver for SimSai {
    fn bridge_port(&self, device: DeviceId, port: PhysicalPort) -> Option<BridgePortOid> {
        self.state.lock().bridge_ports.get(&(device, port)).copied()
    }

    fn router_interface(&self, device: DeviceId, rif: RifId) -> Option<RouterInterfaceOid> {
        self.state.lock().router_interfaces.get(&(device, rif)).copied()
    }

    fn virtual_router(&self, device: DeviceId, vrf: VrfId) -> Option<VirtualRouterOid> {
        self.state.lock().virtual_routers.get(&(device, vrf)).copied()
    }
}
