//! Integration tests for ReplGroupOrch against the simulated switch.
//!
//! Each test builds its own orchestrator and simulated gateway, so tests
//! share no state.

use ipmc_orch::repl_group::{
    CacheError, CachedRouteEntry, ErrorKind, MemberOp, MemberRole, MemberSpec, ReplGroupError,
    ReplGroupOrch, ReplGroupOrchConfig, RouteKey, RouteUpdate,
};
use ipmc_sai::sim::{SimObjectKind, SimOp, SimSai};
use ipmc_sai::{
    IpmcApi, IpmcEntry, IpmcEntryAttrId, IpmcEntryAttribute, IpmcGroupMemberAttribute,
    IpmcGroupMemberOid, IpmcGroupOid, ReplGroupAttribute, ReplGroupOid, ReplGroupOwner,
    RpfGroupMemberAttribute, RpfGroupMemberOid, RpfGroupOid, SaiResult, SaiStatus,
    SubGroupAttribute,
};
use ipmc_types::{DeviceId, PhysicalPort, RifId, VrfId};
use pretty_assertions::assert_eq;
use std::sync::{mpsc, Arc, Barrier};
use std::time::Duration;

const DEV: DeviceId = DeviceId(0);

const P1: PhysicalPort = PhysicalPort::port(0, 1);
const P2: PhysicalPort = PhysicalPort::port(0, 2);
const P3: PhysicalPort = PhysicalPort::port(0, 3);
const P4: PhysicalPort = PhysicalPort::port(0, 4);
const LAG: PhysicalPort = PhysicalPort::lag(7);

struct Fixture {
    sai: Arc<SimSai>,
    orch: ReplGroupOrch,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(ReplGroupOrchConfig::default())
    }

    fn with_config(config: ReplGroupOrchConfig) -> Self {
        let sai = Arc::new(SimSai::new());
        Self::register(&sai, DEV);
        let orch = ReplGroupOrch::new(config, sai.clone(), sai.clone());
        orch.attach_device(DEV).unwrap();
        Self { sai, orch }
    }

    fn register(sai: &SimSai, device: DeviceId) {
        sai.add_virtual_router(device, VrfId(0));
        sai.add_virtual_router(device, VrfId(5));
        for rif in [100, 101, 200, 201, 202] {
            sai.add_router_interface(device, RifId(rif));
        }
        for port in [P1, P2, P3, P4, LAG] {
            sai.add_bridge_port(device, port);
        }
    }

    fn create(&self, ipmc: &[MemberSpec]) -> ReplGroupOid {
        self.orch
            .create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), ipmc)
            .unwrap()
    }

    /// Checks both directions of the group/route cross references.
    fn assert_referential_integrity(&self) {
        self.orch.check_consistency(DEV).unwrap();

        let snapshot = self.orch.snapshot(DEV).unwrap();
        let mut from_groups = 0;
        for group in &snapshot.groups {
            for key in group.ipv4_routes.iter().chain(group.ipv6_routes.iter()) {
                let route = self.orch.get_route(DEV, key).unwrap();
                assert_eq!(route.repl_group, group.id, "route {} points elsewhere", key);
                from_groups += 1;
            }
        }
        for route in &snapshot.routes {
            let group = self.orch.get_group(DEV, route.repl_group).unwrap();
            assert!(group.entries(route.key.family()).contains(&route.key));
        }
        assert_eq!(from_groups, snapshot.routes.len());
    }
}

fn rpf_member() -> MemberSpec {
    MemberSpec::new(RifId(100), [P1, P2])
}

fn ipmc_member(rif: u32, ports: &[PhysicalPort]) -> MemberSpec {
    MemberSpec::new(RifId(rif), ports.iter().copied())
}

fn v4(group: &str) -> RouteKey {
    RouteKey::star_g(VrfId(0), group.parse().unwrap())
}

fn v6(group: &str) -> RouteKey {
    RouteKey::star_g(VrfId(0), group.parse().unwrap())
}

/// Gateway that holds the first `create_repl_group` on one device until
/// the test lets it through. Everything else goes straight to the sim.
struct GatedSai {
    sim: Arc<SimSai>,
    device: DeviceId,
    entered: Barrier,
    release: Barrier,
}

impl GatedSai {
    fn new(sim: Arc<SimSai>, device: DeviceId) -> Self {
        Self {
            sim,
            device,
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl IpmcApi for GatedSai {
    fn create_repl_group(&self, device: DeviceId, attrs: &[ReplGroupAttribute]) -> SaiResult<ReplGroupOid> {
        if device == self.device {
            self.entered.wait();
            self.release.wait();
        }
        self.sim.create_repl_group(device, attrs)
    }

    fn remove_repl_group(&self, device: DeviceId, group: ReplGroupOid) -> SaiResult<()> {
        self.sim.remove_repl_group(device, group)
    }

    fn create_ipmc_group(&self, device: DeviceId, attrs: &[SubGroupAttribute]) -> SaiResult<IpmcGroupOid> {
        self.sim.create_ipmc_group(device, attrs)
    }

    fn remove_ipmc_group(&self, device: DeviceId, group: IpmcGroupOid) -> SaiResult<()> {
        self.sim.remove_ipmc_group(device, group)
    }

    fn create_rpf_group(&self, device: DeviceId, attrs: &[SubGroupAttribute]) -> SaiResult<RpfGroupOid> {
        self.sim.create_rpf_group(device, attrs)
    }

    fn remove_rpf_group(&self, device: DeviceId, group: RpfGroupOid) -> SaiResult<()> {
        self.sim.remove_rpf_group(device, group)
    }

    fn create_ipmc_group_member(
        &self,
        device: DeviceId,
        attrs: &[IpmcGroupMemberAttribute],
    ) -> SaiResult<IpmcGroupMemberOid> {
        self.sim.create_ipmc_group_member(device, attrs)
    }

    fn remove_ipmc_group_member(&self, device: DeviceId, member: IpmcGroupMemberOid) -> SaiResult<()> {
        self.sim.remove_ipmc_group_member(device, member)
    }

    fn set_ipmc_group_member_attribute(
        &self,
        device: DeviceId,
        member: IpmcGroupMemberOid,
        attr: &IpmcGroupMemberAttribute,
    ) -> SaiResult<()> {
        self.sim.set_ipmc_group_member_attribute(device, member, attr)
    }

    fn create_rpf_group_member(
        &self,
        device: DeviceId,
        attrs: &[RpfGroupMemberAttribute],
    ) -> SaiResult<RpfGroupMemberOid> {
        self.sim.create_rpf_group_member(device, attrs)
    }

    fn remove_rpf_group_member(&self, device: DeviceId, member: RpfGroupMemberOid) -> SaiResult<()> {
        self.sim.remove_rpf_group_member(device, member)
    }

    fn set_rpf_group_member_attribute(
        &self,
        device: DeviceId,
        member: RpfGroupMemberOid,
        attr: &RpfGroupMemberAttribute,
    ) -> SaiResult<()> {
        self.sim.set_rpf_group_member_attribute(device, member, attr)
    }

    fn create_ipmc_entry(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        attrs: &[IpmcEntryAttribute],
    ) -> SaiResult<()> {
        self.sim.create_ipmc_entry(device, entry, attrs)
    }

    fn remove_ipmc_entry(&self, device: DeviceId, entry: &IpmcEntry) -> SaiResult<()> {
        self.sim.remove_ipmc_entry(device, entry)
    }

    fn set_ipmc_entry_attribute(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        attr: &IpmcEntryAttribute,
    ) -> SaiResult<()> {
        self.sim.set_ipmc_entry_attribute(device, entry, attr)
    }

    fn get_ipmc_entry_attribute(
        &self,
        device: DeviceId,
        entry: &IpmcEntry,
        ids: &[IpmcEntryAttrId],
    ) -> SaiResult<Vec<IpmcEntryAttribute>> {
        self.sim.get_ipmc_entry_attribute(device, entry, ids)
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_group_route_lifecycle() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let key = v4("230.1.1.1");

    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g).with_copy_to_cpu(true))
        .unwrap();
    let route = fx.orch.get_route(DEV, &key).unwrap();
    assert!(route.copy_to_cpu);
    assert_eq!(route.repl_group, g);
    assert!(fx.orch.verify_route(DEV, &key).unwrap());

    fx.orch.delete_route(DEV, &key).unwrap();
    assert_eq!(fx.orch.get_route(DEV, &key).unwrap_err().kind(), ErrorKind::NotFound);

    fx.orch.delete_replication_group(DEV, g).unwrap();
    assert_eq!(fx.orch.get_group(DEV, g).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(fx.sai.device_object_count(DEV), 0);
    assert_eq!(fx.sai.entry_count(), 0);
}

#[test]
fn test_delete_group_with_route_is_refused() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let key = v4("230.1.1.1");
    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g).with_copy_to_cpu(true))
        .unwrap();
    let objects = fx.sai.device_object_count(DEV);

    let err = fx.orch.delete_replication_group(DEV, g).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Param);

    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.entry_count(), 1);
    assert_eq!(group.members.len(MemberRole::Rpf), 1);
    assert_eq!(group.members.len(MemberRole::Ipmc), 1);
    assert_eq!(fx.sai.device_object_count(DEV), objects);
}

// ============================================================================
// Group creation
// ============================================================================

#[test]
fn test_create_counts_members() {
    let fx = Fixture::new();
    let g = fx.create(&[
        ipmc_member(200, &[P3]),
        ipmc_member(201, &[P4, LAG]),
        ipmc_member(202, &[]),
    ]);

    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.members.len(MemberRole::Rpf), 1);
    assert_eq!(group.members.len(MemberRole::Ipmc), 3);
    assert_eq!(group.members.rpf_member().unwrap().rif, RifId(100));
    assert_eq!(fx.sai.object_count(SimObjectKind::IpmcGroupMember), 3);
    assert_eq!(fx.sai.object_count(SimObjectKind::RpfGroupMember), 1);

    let stats = fx.orch.stats(DEV).unwrap();
    assert_eq!(stats.groups_created, 1);
    assert_eq!(stats.members_added, 4);
}

#[test]
fn test_failing_ipmc_member_is_skipped() {
    let fx = Fixture::new();
    fx.sai
        .fail_nth(SimOp::CreateIpmcGroupMember, 2, SaiStatus::InsufficientResources);

    let g = fx.create(&[
        ipmc_member(200, &[P3]),
        ipmc_member(201, &[P4]),
        ipmc_member(202, &[LAG]),
    ]);

    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.members.len(MemberRole::Rpf), 1);
    assert_eq!(group.members.len(MemberRole::Ipmc), 2);
    assert!(!group.members.contains(MemberRole::Ipmc, RifId(201)));
    assert_eq!(fx.sai.object_count(SimObjectKind::IpmcGroupMember), 2);
    assert_eq!(fx.orch.stats(DEV).unwrap().members_failed, 1);
}

#[test]
fn test_unresolvable_ipmc_port_is_skipped() {
    let fx = Fixture::new();
    let g = fx.create(&[
        ipmc_member(200, &[P3]),
        ipmc_member(201, &[PhysicalPort::port(9, 9)]),
    ]);

    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.members.len(MemberRole::Ipmc), 1);
    assert_eq!(fx.sai.object_count(SimObjectKind::IpmcGroupMember), 1);
}

#[test]
fn test_sub_group_failure_rolls_back_everything() {
    for op in [SimOp::CreateIpmcGroup, SimOp::CreateRpfGroup] {
        let fx = Fixture::new();
        fx.sai.fail_next(op, SaiStatus::TableFull);

        let err = fx
            .orch
            .create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), &[ipmc_member(200, &[P3])])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fail, "{:?}", op);
        assert_eq!(err.status(), Some(SaiStatus::TableFull));

        assert_eq!(fx.sai.device_object_count(DEV), 0, "{:?}", op);
        assert!(fx.orch.group_ids(DEV).unwrap().is_empty());
        assert_eq!(fx.orch.stats(DEV).unwrap().rollbacks, 1);
    }
}

#[test]
fn test_repl_group_failure_touches_nothing() {
    let fx = Fixture::new();
    fx.sai.fail_next(SimOp::CreateReplGroup, SaiStatus::NoMemory);

    let err = fx
        .orch
        .create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fail);
    assert_eq!(fx.sai.device_object_count(DEV), 0);
    assert_eq!(fx.orch.stats(DEV).unwrap().rollbacks, 0);
}

#[test]
fn test_rpf_member_failure_removes_group() {
    let fx = Fixture::new();
    fx.sai.fail_next(SimOp::CreateRpfGroupMember, SaiStatus::Failure);

    let err = fx
        .orch
        .create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), &[ipmc_member(200, &[P3])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fail);

    assert_eq!(fx.sai.device_object_count(DEV), 0);
    assert!(fx.orch.snapshot(DEV).unwrap().groups.is_empty());
    let stats = fx.orch.stats(DEV).unwrap();
    assert_eq!(stats.groups_created, 0);
    assert_eq!(stats.rollbacks, 1);
}

#[test]
fn test_gateway_status_reaches_caller() {
    let fx = Fixture::new();
    for status in [SaiStatus::InvalidObjectId, SaiStatus::InvalidObjectType, SaiStatus::NoMemory] {
        fx.sai.fail_next(SimOp::CreateReplGroup, status);
        let err = fx
            .orch
            .create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fail);
        assert_eq!(err.status(), Some(status));
    }
    assert_eq!(fx.sai.device_object_count(DEV), 0);
}

// ============================================================================
// Group deletion
// ============================================================================

#[test]
fn test_delete_removes_members_before_groups() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3]), ipmc_member(201, &[P4])]);
    let before = fx.sai.calls().len();

    fx.orch.delete_replication_group(DEV, g).unwrap();

    assert_eq!(
        fx.sai.calls()[before..].to_vec(),
        vec![
            SimOp::RemoveRpfGroupMember,
            SimOp::RemoveRpfGroup,
            SimOp::RemoveIpmcGroupMember,
            SimOp::RemoveIpmcGroupMember,
            SimOp::RemoveIpmcGroup,
            SimOp::RemoveReplGroup,
        ]
    );
    assert_eq!(fx.sai.device_object_count(DEV), 0);
    assert_eq!(fx.orch.stats(DEV).unwrap().groups_removed, 1);
}

#[test]
fn test_delete_without_ipmc_group() {
    let fx = Fixture::new();
    let g = fx.create(&[]);
    let before = fx.sai.calls().len();

    fx.orch.delete_replication_group(DEV, g).unwrap();
    assert!(!fx.sai.calls()[before..].contains(&SimOp::RemoveIpmcGroup));
    assert_eq!(fx.sai.device_object_count(DEV), 0);
}

#[test]
fn test_delete_hardware_failure_aborts() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    fx.sai.fail_next(SimOp::RemoveIpmcGroupMember, SaiStatus::Failure);

    let err = fx.orch.delete_replication_group(DEV, g).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fail);

    // Steps before the failure stay done; nothing after it ran.
    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.members.len(MemberRole::Rpf), 0);
    assert!(group.rpf_group.is_null());
    assert_eq!(group.members.len(MemberRole::Ipmc), 1);
    assert!(group.ipmc_group.is_valid());
    assert_eq!(fx.sai.object_count(SimObjectKind::ReplGroup), 1);
    fx.orch.check_consistency(DEV).unwrap();

    // A retry finishes the job.
    fx.orch.delete_replication_group(DEV, g).unwrap();
    assert_eq!(fx.sai.device_object_count(DEV), 0);
}

#[test]
fn test_delete_missing_group_is_not_found() {
    let fx = Fixture::new();
    let g = fx.create(&[]);
    fx.orch.delete_replication_group(DEV, g).unwrap();

    let err = fx.orch.delete_replication_group(DEV, g).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_half_deleted_group_takes_no_new_references() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let other = fx.create(&[ipmc_member(200, &[P3])]);
    let key = v4("230.1.1.1");
    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), other))
        .unwrap();

    fx.sai.fail_next(SimOp::RemoveIpmcGroupMember, SaiStatus::Failure);
    fx.orch.delete_replication_group(DEV, g).unwrap_err();
    assert!(fx.orch.get_group(DEV, g).unwrap().rpf_group.is_null());
    let calls = fx.sai.calls().len();

    let spare = ipmc_member(201, &[P4]);
    let results = [
        fx.orch.add_route(DEV, CachedRouteEntry::new(v4("230.1.1.2"), RifId(100), g)),
        fx.orch.update_route(DEV, &key, RouteUpdate::default().repl_group(g)),
        fx.orch.update_group_membership(DEV, g, MemberOp::Add, MemberRole::Rpf, &rpf_member()),
        fx.orch.update_group_membership(DEV, g, MemberOp::Add, MemberRole::Ipmc, &spare),
    ];
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param);
        assert!(matches!(err, ReplGroupError::Cache(CacheError::GroupIncomplete(id)) if id == g));
    }
    assert_eq!(fx.sai.calls().len(), calls);
    assert_eq!(fx.orch.get_route(DEV, &key).unwrap().repl_group, other);

    fx.orch.delete_replication_group(DEV, g).unwrap();
    fx.assert_referential_integrity();
}

// ============================================================================
// Membership updates
// ============================================================================

#[test]
fn test_second_rpf_member_is_refused() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let calls = fx.sai.calls().len();

    let err = fx
        .orch
        .update_group_membership(DEV, g, MemberOp::Add, MemberRole::Rpf, &MemberSpec::new(RifId(101), [P4]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Param);

    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.members.len(MemberRole::Rpf), 1);
    assert_eq!(group.members.rpf_member().unwrap().rif, RifId(100));
    assert_eq!(fx.sai.calls().len(), calls);
}

#[test]
fn test_membership_add_update_delete() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);

    fx.orch
        .update_group_membership(DEV, g, MemberOp::Add, MemberRole::Ipmc, &ipmc_member(201, &[P4]))
        .unwrap();
    let err = fx
        .orch
        .update_group_membership(DEV, g, MemberOp::Add, MemberRole::Ipmc, &ipmc_member(201, &[P4]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Param);

    // Port order and duplicates do not matter to the cached set.
    fx.orch
        .update_group_membership(DEV, g, MemberOp::Update, MemberRole::Ipmc, &ipmc_member(201, &[LAG, P4, LAG]))
        .unwrap();
    let group = fx.orch.get_group(DEV, g).unwrap();
    let member = group.members.get(MemberRole::Ipmc, RifId(201)).unwrap();
    assert_eq!(member.ports.iter().copied().collect::<Vec<_>>(), vec![P4, LAG]);
    assert_eq!(fx.sai.member_bridge_ports(member.oid).unwrap().len(), 3);

    fx.orch
        .update_group_membership(DEV, g, MemberOp::Delete, MemberRole::Ipmc, &ipmc_member(201, &[]))
        .unwrap();
    assert!(!fx.sai.contains(member.oid));
    assert_eq!(fx.orch.get_group(DEV, g).unwrap().members.len(MemberRole::Ipmc), 1);

    let stats = fx.orch.stats(DEV).unwrap();
    assert_eq!(stats.members_updated, 1);
    assert_eq!(stats.members_removed, 1);
}

#[test]
fn test_membership_on_absent_member_is_param() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);

    for op in [MemberOp::Delete, MemberOp::Update] {
        let err = fx
            .orch
            .update_group_membership(DEV, g, op, MemberRole::Ipmc, &ipmc_member(202, &[P4]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param, "{:?}", op);
    }
}

#[test]
fn test_membership_hardware_failure_leaves_cache() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let before = fx.orch.dump(DEV).unwrap();

    fx.sai.fail_next(SimOp::SetIpmcGroupMember, SaiStatus::Failure);
    let err = fx
        .orch
        .update_group_membership(DEV, g, MemberOp::Update, MemberRole::Ipmc, &ipmc_member(200, &[P4]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fail);

    fx.sai.fail_next(SimOp::RemoveIpmcGroupMember, SaiStatus::Failure);
    let err = fx
        .orch
        .update_group_membership(DEV, g, MemberOp::Delete, MemberRole::Ipmc, &ipmc_member(200, &[]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fail);

    assert_eq!(fx.orch.dump(DEV).unwrap(), before);
}

#[test]
fn test_rpf_member_replace() {
    let fx = Fixture::new();
    let g = fx.create(&[]);

    fx.orch
        .update_group_membership(DEV, g, MemberOp::Delete, MemberRole::Rpf, &rpf_member())
        .unwrap();
    fx.orch
        .update_group_membership(DEV, g, MemberOp::Add, MemberRole::Rpf, &MemberSpec::new(RifId(101), [P3]))
        .unwrap();

    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.members.rpf_member().unwrap().rif, RifId(101));
    assert_eq!(fx.sai.object_count(SimObjectKind::RpfGroupMember), 1);
}

// ============================================================================
// Routes
// ============================================================================

#[test]
fn test_duplicate_route_leaves_cache_unchanged() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let h = fx.create(&[ipmc_member(201, &[P4])]);
    let key = v4("230.1.1.1");
    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g))
        .unwrap();
    let before = fx.orch.dump(DEV).unwrap();
    let calls = fx.sai.calls().len();

    // Same key with a different payload is still the same route.
    let err = fx
        .orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(101), h).with_copy_to_cpu(true))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Param);
    assert_eq!(fx.orch.dump(DEV).unwrap(), before);
    assert_eq!(fx.sai.calls().len(), calls);
}

#[test]
fn test_route_to_missing_group_is_not_found() {
    let fx = Fixture::new();
    let g = fx.create(&[]);
    fx.orch.delete_replication_group(DEV, g).unwrap();

    let err = fx
        .orch
        .add_route(DEV, CachedRouteEntry::new(v4("230.1.1.1"), RifId(100), g))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.sai.entry_count(), 0);
}

#[test]
fn test_invalid_route_key_is_param() {
    let fx = Fixture::new();
    let g = fx.create(&[]);
    let calls = fx.sai.calls().len();

    let unicast = RouteKey::star_g(VrfId(0), "10.0.0.1".parse().unwrap());
    let mixed = RouteKey::source_g(VrfId(0), "2001:db8::1".parse().unwrap(), "230.1.1.1".parse().unwrap());
    for key in [unicast, mixed] {
        let err = fx
            .orch
            .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param, "{}", key);
    }
    assert_eq!(fx.sai.calls().len(), calls);
}

#[test]
fn test_route_hardware_failure_leaves_cache() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let key = v4("230.1.1.1");

    fx.sai.fail_next(SimOp::CreateIpmcEntry, SaiStatus::TableFull);
    let err = fx
        .orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fail);
    assert!(fx.orch.get_route(DEV, &key).is_err());
    assert!(!fx.orch.get_group(DEV, g).unwrap().is_in_use());

    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g))
        .unwrap();
    fx.sai.fail_next(SimOp::RemoveIpmcEntry, SaiStatus::Failure);
    assert_eq!(fx.orch.delete_route(DEV, &key).unwrap_err().kind(), ErrorKind::Fail);
    assert!(fx.orch.get_route(DEV, &key).is_ok());
}

#[test]
fn test_route_round_trip() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let h = fx.create(&[ipmc_member(201, &[P4])]);
    let key = v4("230.1.1.1");

    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g).with_copy_to_cpu(true))
        .unwrap();

    fx.orch
        .update_route(DEV, &key, RouteUpdate::default().copy_to_cpu(false))
        .unwrap();
    let route = fx.orch.get_route(DEV, &key).unwrap();
    assert!(!route.copy_to_cpu);
    assert_eq!(route.repl_group, g);

    fx.orch
        .update_route(DEV, &key, RouteUpdate::default().repl_group(h).iif(RifId(101)))
        .unwrap();
    let route = fx.orch.get_route(DEV, &key).unwrap();
    assert_eq!(route.repl_group, h);
    assert_eq!(route.iif, RifId(101));
    assert!(!route.copy_to_cpu);
    assert!(fx.orch.verify_route(DEV, &key).unwrap());

    // The route left g, so g can go.
    assert!(!fx.orch.get_group(DEV, g).unwrap().is_in_use());
    fx.orch.delete_replication_group(DEV, g).unwrap();
    assert_eq!(fx.orch.stats(DEV).unwrap().routes_updated, 2);
}

#[test]
fn test_update_route_to_missing_group_is_refused() {
    let fx = Fixture::new();
    let g = fx.create(&[]);
    let h = fx.create(&[]);
    fx.orch.delete_replication_group(DEV, h).unwrap();
    let key = v4("230.1.1.1");
    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g))
        .unwrap();

    let err = fx
        .orch
        .update_route(DEV, &key, RouteUpdate::default().repl_group(h))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.orch.get_route(DEV, &key).unwrap().repl_group, g);

    let missing = v4("230.9.9.9");
    let err = fx
        .orch
        .update_route(DEV, &missing, RouteUpdate::default().copy_to_cpu(true))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_route_without_ipmc_group_outputs_null() {
    let fx = Fixture::new();
    let g = fx.create(&[]);
    let key = v4("230.1.1.1");
    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g))
        .unwrap();
    assert!(fx.orch.verify_route(DEV, &key).unwrap());

    // First outgoing member creates the IPMC group and repoints the route.
    fx.orch
        .update_group_membership(DEV, g, MemberOp::Add, MemberRole::Ipmc, &ipmc_member(200, &[P3]))
        .unwrap();
    assert!(fx.orch.get_group(DEV, g).unwrap().ipmc_group.is_valid());
    assert!(fx.orch.verify_route(DEV, &key).unwrap());
}

#[test]
fn test_copy_to_cpu_action_from_config() {
    let config = ReplGroupOrchConfig {
        copy_to_cpu_action: ipmc_sai::PacketAction::Forward,
        audit_enabled: false,
        ..Default::default()
    };
    let fx = Fixture::with_config(config);
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let key = v4("230.1.1.1");

    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g).with_copy_to_cpu(true))
        .unwrap();
    let before = fx.sai.calls().len();

    // Same hardware action either way, so flipping the flag writes nothing.
    fx.orch
        .update_route(DEV, &key, RouteUpdate::default().copy_to_cpu(false))
        .unwrap();
    assert_eq!(fx.sai.calls().len(), before);
    assert!(!fx.orch.get_route(DEV, &key).unwrap().copy_to_cpu);
}

#[test]
fn test_referential_integrity_across_families() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let h = fx.create(&[ipmc_member(201, &[P4])]);

    let a = v4("230.1.1.1");
    let b = v6("ff0e::1");
    let c = RouteKey::source_g(VrfId(5), "10.1.1.1".parse().unwrap(), "232.1.1.1".parse().unwrap());
    let d = RouteKey::source_g(VrfId(0), "2001:db8::1".parse().unwrap(), "ff3e::8000:1".parse().unwrap());

    for (key, group) in [(a, g), (b, g), (c, h), (d, h)] {
        fx.orch
            .add_route(DEV, CachedRouteEntry::new(key, RifId(100), group))
            .unwrap();
        fx.assert_referential_integrity();
    }
    let group = fx.orch.get_group(DEV, g).unwrap();
    assert_eq!(group.ipv4_entries.len(), 1);
    assert_eq!(group.ipv6_entries.len(), 1);

    fx.orch
        .update_route(DEV, &b, RouteUpdate::default().repl_group(h))
        .unwrap();
    fx.assert_referential_integrity();
    fx.orch
        .update_route(DEV, &c, RouteUpdate::default().repl_group(g).copy_to_cpu(true))
        .unwrap();
    fx.assert_referential_integrity();
    fx.orch.delete_route(DEV, &a).unwrap();
    fx.assert_referential_integrity();
    fx.orch.delete_route(DEV, &d).unwrap();
    fx.assert_referential_integrity();

    let snapshot = fx.orch.snapshot(DEV).unwrap();
    assert_eq!(snapshot.routes.len(), 2);
    for key in [b, c] {
        assert!(fx.orch.verify_route(DEV, &key).unwrap(), "{}", key);
    }
}

// ============================================================================
// Devices
// ============================================================================

#[test]
fn test_devices_are_independent() {
    let fx = Fixture::new();
    let other = DeviceId(1);
    Fixture::register(&fx.sai, other);

    assert_eq!(
        fx.orch
            .create_replication_group(other, ReplGroupOwner::Ipmc, &rpf_member(), &[])
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
    fx.orch.attach_device(other).unwrap();
    assert_eq!(fx.orch.attach_device(other).unwrap_err().kind(), ErrorKind::Param);
    assert_eq!(fx.orch.devices(), vec![DEV, other]);

    let g = fx.create(&[ipmc_member(200, &[P3])]);
    let g1 = fx
        .orch
        .create_replication_group(other, ReplGroupOwner::L2mc, &rpf_member(), &[])
        .unwrap();
    let key = v4("230.1.1.1");
    fx.orch
        .add_route(DEV, CachedRouteEntry::new(key, RifId(100), g))
        .unwrap();
    fx.orch
        .add_route(other, CachedRouteEntry::new(key, RifId(100), g1))
        .unwrap();

    // A group id from one device means nothing on the other.
    assert_eq!(fx.orch.get_group(other, g).unwrap_err().kind(), ErrorKind::NotFound);

    fx.orch.delete_route(other, &key).unwrap();
    fx.orch.delete_replication_group(other, g1).unwrap();
    fx.orch.detach_device(other).unwrap();
    assert_eq!(fx.sai.device_object_count(other), 0);
    assert!(fx.orch.get_route(DEV, &key).is_ok());
}

#[test]
fn test_detach_waits_without_blocking_other_devices() {
    let other = DeviceId(1);
    let sim = Arc::new(SimSai::new());
    Fixture::register(&sim, DEV);
    Fixture::register(&sim, other);
    let gate = Arc::new(GatedSai::new(sim.clone(), DEV));
    let orch = ReplGroupOrch::new(ReplGroupOrchConfig::default(), gate.clone(), sim.clone());
    orch.attach_device(DEV).unwrap();
    orch.attach_device(other).unwrap();
    let g1 = orch
        .create_replication_group(other, ReplGroupOwner::Ipmc, &rpf_member(), &[])
        .unwrap();

    std::thread::scope(|scope| {
        let orch = &orch;
        let create = scope.spawn(move || {
            orch.create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), &[])
        });
        // DEV's cache stays locked while its create is parked in the gateway.
        gate.entered.wait();
        let detach = scope.spawn(move || orch.detach_device(DEV));
        std::thread::sleep(Duration::from_millis(50));

        let (tx, rx) = mpsc::channel();
        scope.spawn(move || {
            let _ = tx.send(orch.group_ids(other));
        });
        let ids = rx.recv_timeout(Duration::from_secs(5));
        gate.release.wait();

        assert_eq!(ids.expect("device 1 was blocked by device 0").unwrap(), vec![g1]);
        let g = create.join().unwrap().unwrap();
        assert_eq!(detach.join().unwrap().unwrap_err().kind(), ErrorKind::Param);
        assert_eq!(orch.group_ids(DEV).unwrap(), vec![g]);
    });
}

#[test]
fn test_detached_device_rejects_operations() {
    let fx = Fixture::new();
    let g = fx.create(&[]);
    fx.orch.delete_replication_group(DEV, g).unwrap();
    fx.orch.detach_device(DEV).unwrap();

    let err = fx
        .orch
        .create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), &[])
        .unwrap_err();
    assert!(matches!(err, ReplGroupError::Cache(CacheError::DeviceNotFound(d)) if d == DEV));
    assert_eq!(fx.orch.detach_device(DEV).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(fx.orch.group_ids(DEV).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(fx.sai.device_object_count(DEV), 0);
}

#[test]
fn test_table_full_is_param() {
    let config = ReplGroupOrchConfig {
        max_groups_per_device: 2,
        ..Default::default()
    };
    let fx = Fixture::with_config(config);
    fx.create(&[]);
    fx.create(&[]);
    let objects = fx.sai.device_object_count(DEV);

    let err = fx
        .orch
        .create_replication_group(DEV, ReplGroupOwner::Ipmc, &rpf_member(), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Param);
    assert_eq!(fx.sai.device_object_count(DEV), objects);
}

#[test]
fn test_concurrent_routes_on_one_device() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);

    std::thread::scope(|scope| {
        for t in 0..4u8 {
            let orch = &fx.orch;
            scope.spawn(move || {
                for r in 1..=25u8 {
                    let key = RouteKey::star_g(VrfId(0), format!("230.1.{}.{}", t, r).parse().unwrap());
                    orch.add_route(DEV, CachedRouteEntry::new(key, RifId(100), g)).unwrap();
                }
            });
        }
    });

    assert_eq!(fx.orch.get_group(DEV, g).unwrap().entry_count(), 100);
    assert_eq!(fx.sai.entry_count(), 100);
    assert_eq!(fx.orch.stats(DEV).unwrap().routes_added, 100);
    fx.assert_referential_integrity();
}

#[test]
fn test_dump_is_json() {
    let fx = Fixture::new();
    let g = fx.create(&[ipmc_member(200, &[P3])]);
    fx.orch
        .add_route(DEV, CachedRouteEntry::new(v4("230.1.1.1"), RifId(100), g))
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&fx.orch.dump(DEV).unwrap()).unwrap();
    assert_eq!(value["groups"].as_array().unwrap().len(), 1);
    assert_eq!(value["routes"].as_array().unwrap().len(), 1);
    assert_eq!(value["stats"]["routes_added"], 1);
}
