//! ReplGroupOrch: replication-group and IPMC route orchestration.
//!
//! Every public operation locks the target device's cache for its whole
//! duration, validates against the cache, performs the hardware calls and
//! only then commits to the cache. A hardware failure leaves the cache as
//! it was and undoes whatever hardware the operation had already created.

use super::cache::{CacheError, CacheSnapshot, DeviceCache, ReplGroupCache};
use super::rollback::{log_rollback_error, GroupCreateRollback};
use super::types::{
    CachedRouteEntry, GroupMember, MemberOp, MemberRole, MemberSpec, ReplicationGroup, RouteKey,
    RouteUpdate,
};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use ipmc_sai::types::RawSaiObjectId;
use ipmc_sai::{
    resolve_bridge_ports, resolve_router_interface, resolve_virtual_router, BridgePortOid,
    GroupMemberAttribute, IpmcApi, IpmcEntry, IpmcEntryAttrId, IpmcEntryAttribute,
    IpmcGroupMemberOid, IpmcGroupOid, PacketAction, PortResolver, ReplGroupAttribute,
    ReplGroupOid, ReplGroupOwner, RouterInterfaceOid, RpfGroupMemberOid, RpfGroupOid, SaiError,
    SaiResult, SaiStatus, SubGroupAttribute,
};
use ipmc_types::{normalize_ports, DeviceId, RifId};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Coarse error class reported to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A precondition was violated.
    Param,
    /// The hardware gateway returned non-success.
    Fail,
    /// A group, route or device lookup failed.
    NotFound,
}

#[derive(Debug, Clone, Error)]
pub enum ReplGroupError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("SAI {op} failed: {source}")]
    Sai {
        op: &'static str,
        #[source]
        source: SaiError,
    },

    #[error("Cannot resolve handle: {0}")]
    Unresolved(SaiError),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Replication group table full on device {device} (max {max})")]
    TableFull { device: DeviceId, max: usize },

    #[error("Serialization failed: {0}")]
    Serialize(String),
}

impl ReplGroupError {
    fn sai(op: &'static str) -> impl FnOnce(SaiError) -> Self {
        move |source| ReplGroupError::Sai { op, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplGroupError::Cache(err) => match err {
                CacheError::DeviceNotFound(_)
                | CacheError::GroupNotFound(_)
                | CacheError::RouteNotFound(_) => ErrorKind::NotFound,
                CacheError::Inconsistent(_) => ErrorKind::Fail,
                // Includes MemberNotFound: membership updates on an absent
                // member are a caller error.
                _ => ErrorKind::Param,
            },
            ReplGroupError::Sai { .. } | ReplGroupError::Serialize(_) => ErrorKind::Fail,
            ReplGroupError::Unresolved(_)
            | ReplGroupError::InvalidRoute(_)
            | ReplGroupError::TableFull { .. } => ErrorKind::Param,
        }
    }

    /// SAI status of the failed hardware call, if one failed.
    pub fn status(&self) -> Option<SaiStatus> {
        match self {
            ReplGroupError::Sai { source, .. } => Some(source.status()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReplGroupError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplGroupOrchConfig {
    /// Groups allowed per device before creates are refused.
    pub max_groups_per_device: usize,
    /// Packet action programmed for routes with copy-to-cpu set.
    pub copy_to_cpu_action: PacketAction,
    pub audit_enabled: bool,
}

impl Default for ReplGroupOrchConfig {
    fn default() -> Self {
        Self {
            max_groups_per_device: 4096,
            copy_to_cpu_action: PacketAction::TrapToCpu,
            audit_enabled: true,
        }
    }
}

/// Per-device operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplGroupStats {
    pub groups_created: u64,
    pub groups_removed: u64,
    pub members_added: u64,
    pub members_removed: u64,
    pub members_updated: u64,
    /// IPMC members skipped during group creation.
    pub members_failed: u64,
    pub routes_added: u64,
    pub routes_removed: u64,
    pub routes_updated: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Clone, Copy)]
enum SubGroup {
    Rpf(RpfGroupOid),
    Ipmc(IpmcGroupOid),
}

/// Orchestrates replication groups, their members and the IPMC routes that
/// use them, across any number of devices.
pub struct ReplGroupOrch {
    config: ReplGroupOrchConfig,
    cache: ReplGroupCache,
    sai: Arc<dyn IpmcApi>,
    resolver: Arc<dyn PortResolver>,
}

impl ReplGroupOrch {
    pub fn new(config: ReplGroupOrchConfig, sai: Arc<dyn IpmcApi>, resolver: Arc<dyn PortResolver>) -> Self {
        Self {
            config,
            cache: ReplGroupCache::new(),
            sai,
            resolver,
        }
    }

    pub fn config(&self) -> &ReplGroupOrchConfig {
        &self.config
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.cache.devices()
    }

    pub fn attach_device(&self, device: DeviceId) -> Result<()> {
        let result = self.cache.attach(device).map_err(ReplGroupError::from);
        self.audit_result(AuditCategory::SystemLifecycle, "attach_device", device, device.to_string(), "device", &result);
        if result.is_ok() {
            info!("ReplGroupOrch: attached device {}", device);
        }
        result
    }

    /// Drops the device's cache. Refused while it still has groups.
    pub fn detach_device(&self, device: DeviceId) -> Result<()> {
        let result = self.cache.detach(device).map_err(ReplGroupError::from);
        self.audit_result(AuditCategory::SystemLifecycle, "detach_device", device, device.to_string(), "device", &result);
        if result.is_ok() {
            info!("ReplGroupOrch: detached device {}", device);
        }
        result
    }

    /// Creates a replication group with one RPF member and any number of
    /// IPMC members.
    ///
    /// The group is only returned once it and its RPF member exist; an IPMC
    /// member that cannot be programmed is logged and skipped.
    pub fn create_replication_group(
        &self,
        device: DeviceId,
        owner: ReplGroupOwner,
        rpf: &MemberSpec,
        ipmc: &[MemberSpec],
    ) -> Result<ReplGroupOid> {
        let result = self
            .cache
            .with_device(device, |cache| self.create_group_locked(device, cache, owner, rpf, ipmc));
        let object_id = match &result {
            Ok(id) => id.to_string(),
            Err(_) => format!("rpf rif {}", rpf.rif),
        };
        self.audit_result(AuditCategory::ResourceCreate, "create_replication_group", device, object_id, "repl_group", &result);
        result
    }

    fn create_group_locked(
        &self,
        device: DeviceId,
        cache: &mut DeviceCache,
        owner: ReplGroupOwner,
        rpf: &MemberSpec,
        ipmc: &[MemberSpec],
    ) -> Result<ReplGroupOid> {
        let max = self.config.max_groups_per_device;
        if cache.groups.len() >= max {
            return Err(ReplGroupError::TableFull { device, max });
        }
        resolve_router_interface(self.resolver.as_ref(), device, rpf.rif).map_err(ReplGroupError::Unresolved)?;
        resolve_bridge_ports(self.resolver.as_ref(), device, &rpf.ports).map_err(ReplGroupError::Unresolved)?;

        let repl_group = self
            .sai
            .create_repl_group(device, &[ReplGroupAttribute::Owner(owner)])
            .map_err(ReplGroupError::sai("create_repl_group"))?;
        let mut rollback = GroupCreateRollback::new(self.sai.as_ref(), device, repl_group);

        let sub_group = [SubGroupAttribute::ReplGroup(repl_group)];
        if !ipmc.is_empty() {
            match self.sai.create_ipmc_group(device, &sub_group) {
                Ok(oid) => rollback.ipmc_group = oid,
                Err(e) => {
                    error!("ReplGroupOrch: failed to create IPMC group for {}: {}", repl_group, e);
                    self.roll_back_group(cache, &rollback);
                    return Err(ReplGroupError::sai("create_ipmc_group")(e));
                }
            }
        }
        match self.sai.create_rpf_group(device, &sub_group) {
            Ok(oid) => rollback.rpf_group = oid,
            Err(e) => {
                error!("ReplGroupOrch: failed to create RPF group for {}: {}", repl_group, e);
                self.roll_back_group(cache, &rollback);
                return Err(ReplGroupError::sai("create_rpf_group")(e));
            }
        }

        if let Err(e) = cache.groups.create(repl_group, owner, rollback.rpf_group, rollback.ipmc_group) {
            error!("ReplGroupOrch: cache refused new group {}: {}", repl_group, e);
            self.roll_back_group(cache, &rollback);
            return Err(e.into());
        }
        cache.stats.groups_created += 1;

        // Without its RPF member the group is unusable, so the whole group
        // goes with it.
        if let Err(e) = self.add_member_locked(device, cache, repl_group, MemberRole::Rpf, rpf) {
            error!("ReplGroupOrch: failed to add RPF member rif {} to {}: {}", rpf.rif, repl_group, e);
            if let Err(cache_err) = cache.groups.delete(repl_group) {
                error!("ReplGroupOrch: dropping {} from cache failed: {}", repl_group, cache_err);
            }
            cache.stats.groups_created = cache.stats.groups_created.saturating_sub(1);
            self.roll_back_group(cache, &rollback);
            return Err(e);
        }
        cache.stats.members_added += 1;

        for spec in ipmc {
            match self.add_member_locked(device, cache, repl_group, MemberRole::Ipmc, spec) {
                Ok(_) => cache.stats.members_added += 1,
                Err(e) => {
                    warn!("ReplGroupOrch: skipping IPMC member rif {} of {}: {}", spec.rif, repl_group, e);
                    cache.stats.members_failed += 1;
                }
            }
        }

        info!(
            "ReplGroupOrch: created group {} on device {} ({} IPMC members)",
            repl_group,
            device,
            cache.groups.get(repl_group).map(|g| g.members.len(MemberRole::Ipmc)).unwrap_or(0)
        );
        Ok(repl_group)
    }

    fn roll_back_group(&self, cache: &mut DeviceCache, rollback: &GroupCreateRollback<'_>) {
        let failed = rollback.run();
        cache.stats.rollbacks += 1;
        if self.config.audit_enabled {
            let record = AuditRecord::new(AuditCategory::Rollback, "ReplGroupOrch", "create_replication_group")
                .with_object_id(rollback.repl_group.to_string())
                .with_object_type("repl_group")
                .with_details(serde_json::json!({ "failed_steps": failed }));
            let record = if failed == 0 {
                record.with_outcome(AuditOutcome::Success)
            } else {
                record.with_error(format!("{} rollback steps failed", failed))
            };
            audit_log!(record);
        }
    }

    /// Deletes an unused replication group, members first.
    pub fn delete_replication_group(&self, device: DeviceId, id: ReplGroupOid) -> Result<()> {
        let result = self.cache.with_device(device, |cache| self.delete_group_locked(device, cache, id));
        self.audit_result(AuditCategory::ResourceDelete, "delete_replication_group", device, id.to_string(), "repl_group", &result);
        result
    }

    fn delete_group_locked(&self, device: DeviceId, cache: &mut DeviceCache, id: ReplGroupOid) -> Result<()> {
        let group = cache.groups.get(id)?;
        if group.is_in_use() {
            return Err(CacheError::GroupInUse {
                group: id,
                routes: group.entry_count(),
            }
            .into());
        }
        let rpf_members: Vec<_> = group.members.list(MemberRole::Rpf).iter().map(|m| (m.rif, m.oid)).collect();
        let ipmc_members: Vec<_> = group.members.list(MemberRole::Ipmc).iter().map(|m| (m.rif, m.oid)).collect();
        let rpf_group = group.rpf_group;
        let ipmc_group = group.ipmc_group;

        for (rif, oid) in rpf_members {
            self.remove_hw_member(device, MemberRole::Rpf, oid)?;
            cache.groups.get_mut(id)?.members.remove(MemberRole::Rpf, rif)?;
            cache.stats.members_removed += 1;
        }

        if rpf_group.is_valid() {
            self.sai
                .remove_rpf_group(device, rpf_group)
                .map_err(ReplGroupError::sai("remove_rpf_group"))?;
            cache.groups.get_mut(id)?.rpf_group = RpfGroupOid::NULL;
        }

        for (rif, oid) in ipmc_members {
            self.remove_hw_member(device, MemberRole::Ipmc, oid)?;
            cache.groups.get_mut(id)?.members.remove(MemberRole::Ipmc, rif)?;
            cache.stats.members_removed += 1;
        }

        if ipmc_group.is_valid() {
            self.sai
                .remove_ipmc_group(device, ipmc_group)
                .map_err(ReplGroupError::sai("remove_ipmc_group"))?;
            cache.groups.get_mut(id)?.ipmc_group = IpmcGroupOid::NULL;
        }

        self.sai
            .remove_repl_group(device, id)
            .map_err(ReplGroupError::sai("remove_repl_group"))?;
        cache.groups.delete(id)?;
        cache.stats.groups_removed += 1;

        info!("ReplGroupOrch: deleted group {} on device {}", id, device);
        Ok(())
    }

    /// Adds, removes or re-ports a single member of an existing group.
    pub fn update_group_membership(
        &self,
        device: DeviceId,
        id: ReplGroupOid,
        op: MemberOp,
        role: MemberRole,
        member: &MemberSpec,
    ) -> Result<()> {
        let result = self
            .cache
            .with_device(device, |cache| self.update_membership_locked(device, cache, id, op, role, member));
        if self.config.audit_enabled {
            let record = AuditRecord::new(AuditCategory::ResourceModify, "ReplGroupOrch", "update_group_membership")
                .with_object_id(id.to_string())
                .with_object_type("repl_group_member")
                .with_details(serde_json::json!({
                    "device": device,
                    "op": op,
                    "role": role,
                    "rif": member.rif,
                    "ports": member.ports.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
                }));
            audit_log!(Self::finish_record(record, &result));
        }
        result
    }

    fn update_membership_locked(
        &self,
        device: DeviceId,
        cache: &mut DeviceCache,
        id: ReplGroupOid,
        op: MemberOp,
        role: MemberRole,
        spec: &MemberSpec,
    ) -> Result<()> {
        let group = cache.groups.get(id)?;
        match op {
            MemberOp::Add => {
                self.add_member_locked(device, cache, id, role, spec)?;
                cache.stats.members_added += 1;
            }
            MemberOp::Delete => {
                let oid = group.members.handle(role, spec.rif)?;
                self.remove_hw_member(device, role, oid)?;
                cache.groups.get_mut(id)?.members.remove(role, spec.rif)?;
                cache.stats.members_removed += 1;
            }
            MemberOp::Update => {
                let oid = group.members.handle(role, spec.rif)?;
                let ports = resolve_bridge_ports(self.resolver.as_ref(), device, &spec.ports)
                    .map_err(ReplGroupError::Unresolved)?;
                self.set_hw_member_ports(device, role, oid, ports)?;
                cache
                    .groups
                    .get_mut(id)?
                    .members
                    .update_ports(role, spec.rif, normalize_ports(&spec.ports))?;
                cache.stats.members_updated += 1;
            }
        }
        debug!("ReplGroupOrch: {:?} {} member rif {} on {}", op, role, spec.rif, id);
        Ok(())
    }

    /// Programs one member and records it, creating the group's IPMC
    /// sub-group first if this is its first outgoing member.
    fn add_member_locked(
        &self,
        device: DeviceId,
        cache: &mut DeviceCache,
        id: ReplGroupOid,
        role: MemberRole,
        spec: &MemberSpec,
    ) -> Result<RawSaiObjectId> {
        let group = Self::usable_group(cache, id)?;
        group.members.check_add(role, spec.rif)?;
        let rpf_group = group.rpf_group;
        let ipmc_group = group.ipmc_group;
        let routes: Vec<RouteKey> = group.ipv4_entries.iter().chain(group.ipv6_entries.iter()).copied().collect();

        let rif = resolve_router_interface(self.resolver.as_ref(), device, spec.rif)
            .map_err(ReplGroupError::Unresolved)?;
        let ports = resolve_bridge_ports(self.resolver.as_ref(), device, &spec.ports)
            .map_err(ReplGroupError::Unresolved)?;

        let mut lazy_ipmc = None;
        let sub_group = match role {
            MemberRole::Rpf => SubGroup::Rpf(rpf_group),
            MemberRole::Ipmc if ipmc_group.is_valid() => SubGroup::Ipmc(ipmc_group),
            MemberRole::Ipmc => {
                let oid = self
                    .sai
                    .create_ipmc_group(device, &[SubGroupAttribute::ReplGroup(id)])
                    .map_err(ReplGroupError::sai("create_ipmc_group"))?;
                debug!("ReplGroupOrch: created IPMC group {} for {}", oid, id);
                lazy_ipmc = Some(oid);
                SubGroup::Ipmc(oid)
            }
        };
        let context = format!("for member rif {} of {}", spec.rif, id);

        let member = match self.create_hw_member(device, sub_group, rif, ports) {
            Ok(oid) => oid,
            Err(e) => {
                if let Some(oid) = lazy_ipmc {
                    log_rollback_error("remove_ipmc_group", &context, self.sai.remove_ipmc_group(device, oid));
                    cache.stats.rollbacks += 1;
                }
                return Err(e);
            }
        };

        if let Some(oid) = lazy_ipmc {
            // Routes already on this group start replicating to the new
            // sub-group.
            if let Err(e) = self.repoint_output_group(device, &routes, oid) {
                log_rollback_error("remove_member", &context, self.remove_hw_member_raw(device, MemberRole::Ipmc, member));
                log_rollback_error("remove_ipmc_group", &context, self.sai.remove_ipmc_group(device, oid));
                cache.stats.rollbacks += 1;
                return Err(e);
            }
        }

        let committed = cache
            .groups
            .get_mut(id)
            .and_then(|group| group.members.add(role, GroupMember::new(member, spec.rif, &spec.ports)).map(|_| group));
        match committed {
            Ok(group) => {
                if let Some(oid) = lazy_ipmc {
                    group.ipmc_group = oid;
                }
                Ok(member)
            }
            Err(e) => {
                error!("ReplGroupOrch: cache refused {} member rif {} of {}: {}", role, spec.rif, id, e);
                if lazy_ipmc.is_some() {
                    if let Err(reset) = self.repoint_output_group(device, &routes, IpmcGroupOid::NULL) {
                        warn!("ReplGroupOrch: rollback reset_output_group {} failed: {}", context, reset);
                    }
                }
                log_rollback_error("remove_member", &context, self.remove_hw_member_raw(device, role, member));
                if let Some(oid) = lazy_ipmc {
                    log_rollback_error("remove_ipmc_group", &context, self.sai.remove_ipmc_group(device, oid));
                }
                cache.stats.rollbacks += 1;
                Err(e.into())
            }
        }
    }

    fn repoint_output_group(&self, device: DeviceId, routes: &[RouteKey], group: IpmcGroupOid) -> Result<()> {
        let mut done: Vec<IpmcEntry> = Vec::with_capacity(routes.len());
        for key in routes {
            let attr = IpmcEntryAttribute::OutputGroup(group);
            let result = self
                .hw_entry(device, key)
                .and_then(|entry| {
                    self.sai
                        .set_ipmc_entry_attribute(device, &entry, &attr)
                        .map(|_| entry)
                        .map_err(ReplGroupError::sai("set_ipmc_entry_attribute"))
                });
            match result {
                Ok(entry) => done.push(entry),
                Err(e) => {
                    let null = IpmcEntryAttribute::OutputGroup(IpmcGroupOid::NULL);
                    for entry in &done {
                        log_rollback_error(
                            "reset_output_group",
                            &entry.to_string(),
                            self.sai.set_ipmc_entry_attribute(device, entry, &null),
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn create_hw_member(
        &self,
        device: DeviceId,
        sub_group: SubGroup,
        rif: RouterInterfaceOid,
        ports: Vec<BridgePortOid>,
    ) -> Result<RawSaiObjectId> {
        match sub_group {
            SubGroup::Rpf(group) => self
                .sai
                .create_rpf_group_member(
                    device,
                    &[
                        GroupMemberAttribute::Group(group),
                        GroupMemberAttribute::RouterInterface(rif),
                        GroupMemberAttribute::BridgePorts(ports),
                    ],
                )
                .map(|oid| oid.as_raw())
                .map_err(ReplGroupError::sai("create_rpf_group_member")),
            SubGroup::Ipmc(group) => self
                .sai
                .create_ipmc_group_member(
                    device,
                    &[
                        GroupMemberAttribute::Group(group),
                        GroupMemberAttribute::RouterInterface(rif),
                        GroupMemberAttribute::BridgePorts(ports),
                    ],
                )
                .map(|oid| oid.as_raw())
                .map_err(ReplGroupError::sai("create_ipmc_group_member")),
        }
    }

    fn remove_hw_member_raw(&self, device: DeviceId, role: MemberRole, oid: RawSaiObjectId) -> SaiResult<()> {
        match role {
            MemberRole::Rpf => self
                .sai
                .remove_rpf_group_member(device, RpfGroupMemberOid::from_raw_unchecked(oid)),
            MemberRole::Ipmc => self
                .sai
                .remove_ipmc_group_member(device, IpmcGroupMemberOid::from_raw_unchecked(oid)),
        }
    }

    fn remove_hw_member(&self, device: DeviceId, role: MemberRole, oid: RawSaiObjectId) -> Result<()> {
        let op = match role {
            MemberRole::Rpf => "remove_rpf_group_member",
            MemberRole::Ipmc => "remove_ipmc_group_member",
        };
        self.remove_hw_member_raw(device, role, oid)
            .map_err(ReplGroupError::sai(op))
    }

    fn set_hw_member_ports(
        &self,
        device: DeviceId,
        role: MemberRole,
        oid: RawSaiObjectId,
        ports: Vec<BridgePortOid>,
    ) -> Result<()> {
        match role {
            MemberRole::Rpf => self
                .sai
                .set_rpf_group_member_attribute(
                    device,
                    RpfGroupMemberOid::from_raw_unchecked(oid),
                    &GroupMemberAttribute::BridgePorts(ports),
                )
                .map_err(ReplGroupError::sai("set_rpf_group_member_attribute")),
            MemberRole::Ipmc => self
                .sai
                .set_ipmc_group_member_attribute(
                    device,
                    IpmcGroupMemberOid::from_raw_unchecked(oid),
                    &GroupMemberAttribute::BridgePorts(ports),
                )
                .map_err(ReplGroupError::sai("set_ipmc_group_member_attribute")),
        }
    }

    fn packet_action(&self, copy_to_cpu: bool) -> PacketAction {
        if copy_to_cpu {
            self.config.copy_to_cpu_action
        } else {
            PacketAction::Forward
        }
    }

    /// Looks up a group that routes and new members may still reference.
    fn usable_group(cache: &DeviceCache, id: ReplGroupOid) -> Result<&ReplicationGroup> {
        let group = cache.groups.get(id)?;
        if !group.is_complete() {
            return Err(CacheError::GroupIncomplete(id).into());
        }
        Ok(group)
    }

    fn hw_entry(&self, device: DeviceId, key: &RouteKey) -> Result<IpmcEntry> {
        let vr_id = resolve_virtual_router(self.resolver.as_ref(), device, key.vrf)
            .map_err(ReplGroupError::Unresolved)?;
        Ok(IpmcEntry {
            vr_id,
            entry_type: key.entry_type,
            destination: key.group,
            source: key.source,
        })
    }

    fn route_attributes(&self, group: &ReplicationGroup, iif: RouterInterfaceOid, copy_to_cpu: bool) -> Vec<IpmcEntryAttribute> {
        vec![
            IpmcEntryAttribute::PacketAction(self.packet_action(copy_to_cpu)),
            IpmcEntryAttribute::OutputGroup(group.ipmc_group),
            IpmcEntryAttribute::RpfGroup(group.rpf_group),
            IpmcEntryAttribute::IngressInterface(iif),
        ]
    }

    /// Programs a new route on the group named in `route`.
    pub fn add_route(&self, device: DeviceId, route: CachedRouteEntry) -> Result<()> {
        let result = self.cache.with_device(device, |cache| self.add_route_locked(device, cache, route));
        if self.config.audit_enabled {
            let record = AuditRecord::new(AuditCategory::ResourceCreate, "ReplGroupOrch", "add_route")
                .with_object_id(route.key.to_string())
                .with_object_type("ipmc_entry")
                .with_details(serde_json::json!({
                    "device": device,
                    "repl_group": route.repl_group,
                    "iif": route.iif,
                    "copy_to_cpu": route.copy_to_cpu,
                }));
            audit_log!(Self::finish_record(record, &result));
        }
        result
    }

    fn add_route_locked(&self, device: DeviceId, cache: &mut DeviceCache, route: CachedRouteEntry) -> Result<()> {
        route.key.validate().map_err(ReplGroupError::InvalidRoute)?;
        cache.check_add_route(&route)?;
        let group = Self::usable_group(cache, route.repl_group)?;

        let entry = self.hw_entry(device, &route.key)?;
        let iif = resolve_router_interface(self.resolver.as_ref(), device, route.iif)
            .map_err(ReplGroupError::Unresolved)?;
        let attrs = self.route_attributes(group, iif, route.copy_to_cpu);

        self.sai
            .create_ipmc_entry(device, &entry, &attrs)
            .map_err(ReplGroupError::sai("create_ipmc_entry"))?;
        cache.add_route(route)?;
        cache.stats.routes_added += 1;

        debug!("ReplGroupOrch: added route {} on group {}", route.key, route.repl_group);
        Ok(())
    }

    pub fn delete_route(&self, device: DeviceId, key: &RouteKey) -> Result<()> {
        let result = self.cache.with_device(device, |cache| self.delete_route_locked(device, cache, key));
        self.audit_result(AuditCategory::ResourceDelete, "delete_route", device, key.to_string(), "ipmc_entry", &result);
        result
    }

    fn delete_route_locked(&self, device: DeviceId, cache: &mut DeviceCache, key: &RouteKey) -> Result<()> {
        let group = cache.routes.group_ref(key)?;
        let entry = self.hw_entry(device, key)?;

        self.sai
            .remove_ipmc_entry(device, &entry)
            .map_err(ReplGroupError::sai("remove_ipmc_entry"))?;
        cache.remove_route(key)?;
        cache.stats.routes_removed += 1;

        debug!("ReplGroupOrch: deleted route {} from group {}", key, group);
        Ok(())
    }

    /// Applies `update` to an existing route, writing only the attributes
    /// whose hardware value actually changes.
    pub fn update_route(&self, device: DeviceId, key: &RouteKey, update: RouteUpdate) -> Result<()> {
        let result = self
            .cache
            .with_device(device, |cache| self.update_route_locked(device, cache, key, update));
        if self.config.audit_enabled {
            let record = AuditRecord::new(AuditCategory::ResourceModify, "ReplGroupOrch", "update_route")
                .with_object_id(key.to_string())
                .with_object_type("ipmc_entry")
                .with_details(serde_json::json!({
                    "device": device,
                    "repl_group": update.repl_group,
                    "copy_to_cpu": update.copy_to_cpu,
                    "iif": update.iif,
                }));
            audit_log!(Self::finish_record(record, &result));
        }
        result
    }

    fn update_route_locked(
        &self,
        device: DeviceId,
        cache: &mut DeviceCache,
        key: &RouteKey,
        update: RouteUpdate,
    ) -> Result<()> {
        let current = *cache.routes.get(key)?;
        let old_group = cache.groups.get(current.repl_group)?;
        let new_group = Self::usable_group(cache, update.repl_group.unwrap_or(current.repl_group))?;

        let old_iif = resolve_router_interface(self.resolver.as_ref(), device, current.iif)
            .map_err(ReplGroupError::Unresolved)?;
        let new_iif = match update.iif {
            Some(rif) if rif != current.iif => resolve_router_interface(self.resolver.as_ref(), device, rif)
                .map_err(ReplGroupError::Unresolved)?,
            _ => old_iif,
        };
        let copy_to_cpu = update.copy_to_cpu.unwrap_or(current.copy_to_cpu);

        let old_attrs = self.route_attributes(old_group, old_iif, current.copy_to_cpu);
        let new_attrs = self.route_attributes(new_group, new_iif, copy_to_cpu);
        let changes: Vec<_> = old_attrs
            .iter()
            .zip(new_attrs.iter())
            .filter(|(old, new)| old != new)
            .map(|(old, new)| (*old, *new))
            .collect();

        if !changes.is_empty() {
            let entry = self.hw_entry(device, key)?;
            for (i, (_, new)) in changes.iter().enumerate() {
                if let Err(e) = self.sai.set_ipmc_entry_attribute(device, &entry, new) {
                    for (old, _) in &changes[..i] {
                        log_rollback_error("restore_route_attribute", &key.to_string(), self.sai.set_ipmc_entry_attribute(device, &entry, old));
                    }
                    if i > 0 {
                        cache.stats.rollbacks += 1;
                    }
                    return Err(ReplGroupError::sai("set_ipmc_entry_attribute")(e));
                }
            }
        }

        if let Some(group) = update.repl_group {
            cache.move_route(key, group)?;
        }
        if let Some(value) = update.copy_to_cpu {
            cache.routes.update_copy_to_cpu(key, value)?;
        }
        if let Some(rif) = update.iif {
            cache.routes.update_iif(key, rif)?;
        }
        cache.stats.routes_updated += 1;

        debug!("ReplGroupOrch: updated route {} ({} attributes written)", key, changes.len());
        Ok(())
    }

    pub fn get_route(&self, device: DeviceId, key: &RouteKey) -> Result<CachedRouteEntry> {
        self.cache
            .with_device(device, |cache| cache.routes.get(key).copied().map_err(ReplGroupError::from))
    }

    /// Returns a detached copy of a cached group.
    pub fn get_group(&self, device: DeviceId, id: ReplGroupOid) -> Result<ReplicationGroup> {
        self.cache
            .with_device(device, |cache| cache.groups.get(id).cloned().map_err(ReplGroupError::from))
    }

    /// Reads a route back from hardware and compares it with the cache.
    ///
    /// Returns `Ok(false)` and logs each differing attribute on mismatch.
    pub fn verify_route(&self, device: DeviceId, key: &RouteKey) -> Result<bool> {
        self.cache.with_device(device, |cache| self.verify_route_locked(device, cache, key))
    }

    fn verify_route_locked(&self, device: DeviceId, cache: &DeviceCache, key: &RouteKey) -> Result<bool> {
        let route = *cache.routes.get(key)?;
        let group = cache.groups.get(route.repl_group)?;
        let iif = resolve_router_interface(self.resolver.as_ref(), device, route.iif)
            .map_err(ReplGroupError::Unresolved)?;
        let expected = self.route_attributes(group, iif, route.copy_to_cpu);

        let entry = self.hw_entry(device, key)?;
        let ids = [
            IpmcEntryAttrId::PacketAction,
            IpmcEntryAttrId::OutputGroup,
            IpmcEntryAttrId::RpfGroup,
            IpmcEntryAttrId::IngressInterface,
        ];
        let actual = self
            .sai
            .get_ipmc_entry_attribute(device, &entry, &ids)
            .map_err(ReplGroupError::sai("get_ipmc_entry_attribute"))?;

        let mut consistent = actual.len() == expected.len();
        for want in &expected {
            match actual.iter().find(|attr| attr.id() == want.id()) {
                Some(got) if got == want => {}
                got => {
                    warn!("ReplGroupOrch: route {} expected {:?}, hardware has {:?}", key, want, got);
                    consistent = false;
                }
            }
        }
        Ok(consistent)
    }

    /// Ids of every group on the device, ascending.
    pub fn group_ids(&self, device: DeviceId) -> Result<Vec<ReplGroupOid>> {
        self.cache.with_device(device, |cache| Ok(cache.groups.group_ids()))
    }

    pub fn stats(&self, device: DeviceId) -> Result<ReplGroupStats> {
        self.cache.with_device(device, |cache| Ok(cache.stats.clone()))
    }

    pub fn snapshot(&self, device: DeviceId) -> Result<CacheSnapshot> {
        self.cache.with_device(device, |cache| Ok(cache.snapshot(device)))
    }

    /// Pretty-printed JSON of [`snapshot`](Self::snapshot).
    pub fn dump(&self, device: DeviceId) -> Result<String> {
        let snapshot = self.snapshot(device)?;
        serde_json::to_string_pretty(&snapshot).map_err(|e| ReplGroupError::Serialize(e.to_string()))
    }

    pub fn check_consistency(&self, device: DeviceId) -> Result<()> {
        self.cache.with_device(device, |cache| cache.check_consistency().map_err(ReplGroupError::from))
    }

    fn finish_record<T>(record: AuditRecord, result: &Result<T>) -> AuditRecord {
        match result {
            Ok(_) => record.with_outcome(AuditOutcome::Success),
            Err(e) if e.kind() == ErrorKind::Fail => record.with_error(e.to_string()),
            Err(e) => record.with_outcome(AuditOutcome::Denied).with_error(e.to_string()),
        }
    }

    fn audit_result<T>(
        &self,
        category: AuditCategory,
        action: &str,
        device: DeviceId,
        object_id: String,
        object_type: &str,
        result: &Result<T>,
    ) {
        if !self.config.audit_enabled {
            return;
        }
        let record = AuditRecord::new(category, "ReplGroupOrch", action)
            .with_object_id(object_id)
            .with_object_type(object_type)
            .with_details(serde_json::json!({ "device": device }));
        audit_log!(Self::finish_record(record, result));
    }
}
