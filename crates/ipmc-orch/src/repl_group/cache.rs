//! Per-device replication-group cache and the device registry.
//!
//! A [`DeviceCache`] holds the group table and route index of one device
//! and keeps them pointing at each other. [`ReplGroupCache`] maps device
//! ids to their caches; each device cache sits behind its own mutex.

use super::orch::ReplGroupStats;
use super::route_index::RouteEntryIndex;
use super::table::ReplGroupTable;
use super::types::{CachedRouteEntry, GroupMember, MemberRole, RouteKey};
use ipmc_sai::{IpmcGroupOid, ReplGroupOid, ReplGroupOwner, RpfGroupOid};
use ipmc_types::{DeviceId, RifId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Device not attached: {0}")]
    DeviceNotFound(DeviceId),

    #[error("Device already attached: {0}")]
    DeviceExists(DeviceId),

    #[error("Device {device} still has {groups} replication groups")]
    DeviceBusy { device: DeviceId, groups: usize },

    #[error("Replication group already exists: {0}")]
    GroupExists(ReplGroupOid),

    #[error("Replication group not found: {0}")]
    GroupNotFound(ReplGroupOid),

    #[error("Replication group {group} still referenced by {routes} routes")]
    GroupInUse { group: ReplGroupOid, routes: usize },

    #[error("Replication group {0} has no RPF sub-group")]
    GroupIncomplete(ReplGroupOid),

    #[error("{role} member already exists on rif {rif}")]
    MemberExists { role: MemberRole, rif: RifId },

    #[error("{role} member not found on rif {rif}")]
    MemberNotFound { role: MemberRole, rif: RifId },

    #[error("Group already has an RPF member on rif {existing}")]
    RpfMemberExists { existing: RifId },

    #[error("Route already exists: {0}")]
    RouteExists(RouteKey),

    #[error("Route not found: {0}")]
    RouteNotFound(RouteKey),

    #[error("Cache inconsistency: {0}")]
    Inconsistent(String),
}

/// Everything cached for one device.
#[derive(Debug, Default)]
pub struct DeviceCache {
    pub groups: ReplGroupTable,
    pub routes: RouteEntryIndex,
    pub stats: ReplGroupStats,
    detached: bool,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set once the registry has dropped this cache; a caller still
    /// holding the handle must not touch it.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Validates an [`add_route`](Self::add_route) without mutating.
    pub fn check_add_route(&self, entry: &CachedRouteEntry) -> Result<(), CacheError> {
        self.routes.check_add(&entry.key)?;
        self.groups.get(entry.repl_group)?;
        Ok(())
    }

    /// Indexes the route and records it in its group's per-family set.
    pub fn add_route(&mut self, entry: CachedRouteEntry) -> Result<(), CacheError> {
        self.check_add_route(&entry)?;
        self.routes.add(entry)?;
        self.groups
            .get_mut(entry.repl_group)?
            .entries_mut(entry.key.family())
            .insert(entry.key);
        Ok(())
    }

    pub fn remove_route(&mut self, key: &RouteKey) -> Result<CachedRouteEntry, CacheError> {
        let group_id = self.routes.group_ref(key)?;
        let group = self.groups.get_mut(group_id).map_err(|_| {
            CacheError::Inconsistent(format!("route {} points at missing group {}", key, group_id))
        })?;
        group.entries_mut(key.family()).remove(key);
        self.routes.remove(key)
    }

    /// Moves a route to another group and returns the group it left.
    pub fn move_route(&mut self, key: &RouteKey, to: ReplGroupOid) -> Result<ReplGroupOid, CacheError> {
        let from = self.routes.group_ref(key)?;
        if from == to {
            return Ok(from);
        }
        self.groups.get(to)?;
        self.groups.get_mut(from)?.entries_mut(key.family()).remove(key);
        self.groups.get_mut(to)?.entries_mut(key.family()).insert(*key);
        self.routes.update_group_ref(key, to)
    }

    /// Verifies groups and the route index agree in both directions.
    pub fn check_consistency(&self) -> Result<(), CacheError> {
        for group in self.groups.groups() {
            if group.members.len(MemberRole::Rpf) > 1 {
                return Err(CacheError::Inconsistent(format!(
                    "group {} has {} RPF members",
                    group.id,
                    group.members.len(MemberRole::Rpf)
                )));
            }
            for key in group.ipv4_entries.iter().chain(group.ipv6_entries.iter()) {
                if group.entries(key.family()).get(key).is_none() {
                    return Err(CacheError::Inconsistent(format!(
                        "route {} filed under the wrong family in group {}",
                        key, group.id
                    )));
                }
                match self.routes.group_ref(key) {
                    Ok(owner) if owner == group.id => {}
                    Ok(owner) => {
                        return Err(CacheError::Inconsistent(format!(
                            "route {} listed in group {} but indexed to {}",
                            key, group.id, owner
                        )))
                    }
                    Err(_) => {
                        return Err(CacheError::Inconsistent(format!(
                            "route {} listed in group {} but not indexed",
                            key, group.id
                        )))
                    }
                }
            }
        }
        for entry in self.routes.iter() {
            let listed = self
                .groups
                .get(entry.repl_group)
                .map(|group| group.entries(entry.key.family()).contains(&entry.key))
                .unwrap_or(false);
            if !listed {
                return Err(CacheError::Inconsistent(format!(
                    "route {} indexed to {} but not listed there",
                    entry.key, entry.repl_group
                )));
            }
        }
        Ok(())
    }

    pub fn snapshot(&self, device: DeviceId) -> CacheSnapshot {
        let groups = self
            .groups
            .group_ids()
            .into_iter()
            .filter_map(|id| self.groups.get(id).ok())
            .map(|group| {
                let mut ipv4_routes: Vec<_> = group.ipv4_entries.iter().copied().collect();
                let mut ipv6_routes: Vec<_> = group.ipv6_entries.iter().copied().collect();
                ipv4_routes.sort();
                ipv6_routes.sort();
                GroupSnapshot {
                    id: group.id,
                    owner: group.owner,
                    rpf_group: group.rpf_group,
                    ipmc_group: group.ipmc_group,
                    rpf_members: group.members.list(MemberRole::Rpf).into_iter().cloned().collect(),
                    ipmc_members: group.members.list(MemberRole::Ipmc).into_iter().cloned().collect(),
                    ipv4_routes,
                    ipv6_routes,
                }
            })
            .collect();
        let mut routes: Vec<_> = self.routes.iter().copied().collect();
        routes.sort_by_key(|entry| entry.key);

        CacheSnapshot {
            device,
            groups,
            routes,
            stats: self.stats.clone(),
        }
    }
}

/// Serializable view of one group, for dumps.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    pub id: ReplGroupOid,
    pub owner: ReplGroupOwner,
    pub rpf_group: RpfGroupOid,
    pub ipmc_group: IpmcGroupOid,
    pub rpf_members: Vec<GroupMember>,
    pub ipmc_members: Vec<GroupMember>,
    pub ipv4_routes: Vec<RouteKey>,
    pub ipv6_routes: Vec<RouteKey>,
}

/// Serializable view of a device cache. Groups and routes are sorted so
/// dumps are stable.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub device: DeviceId,
    pub groups: Vec<GroupSnapshot>,
    pub routes: Vec<CachedRouteEntry>,
    pub stats: ReplGroupStats,
}

/// Registry of attached devices.
///
/// The registry lock is only held long enough to clone a device handle;
/// callers then lock the device cache itself for the length of an
/// operation.
#[derive(Debug, Default)]
pub struct ReplGroupCache {
    devices: RwLock<HashMap<DeviceId, Arc<Mutex<DeviceCache>>>>,
}

impl ReplGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, device: DeviceId) -> Result<(), CacheError> {
        let mut devices = self.devices.write();
        if devices.contains_key(&device) {
            return Err(CacheError::DeviceExists(device));
        }
        devices.insert(device, Arc::new(Mutex::new(DeviceCache::new())));
        Ok(())
    }

    /// Drops a device's cache. Refused while it still holds groups.
    ///
    /// The registry lock is not held while waiting for the device lock.
    pub fn detach(&self, device: DeviceId) -> Result<(), CacheError> {
        let handle = self.device(device)?;
        let mut cache = handle.lock();
        if cache.detached {
            return Err(CacheError::DeviceNotFound(device));
        }
        let groups = cache.groups.len();
        if groups > 0 {
            return Err(CacheError::DeviceBusy { device, groups });
        }
        cache.detached = true;
        drop(cache);

        let mut devices = self.devices.write();
        if matches!(devices.get(&device), Some(current) if Arc::ptr_eq(current, &handle)) {
            devices.remove(&device);
        }
        Ok(())
    }

    /// Runs `f` with the device's cache locked.
    ///
    /// Fails with `DeviceNotFound` when the device is not attached, or was
    /// detached while the caller waited for its lock.
    pub fn with_device<T, E>(
        &self,
        device: DeviceId,
        f: impl FnOnce(&mut DeviceCache) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<CacheError>,
    {
        let handle = self.device(device)?;
        let mut cache = handle.lock();
        if cache.detached {
            return Err(CacheError::DeviceNotFound(device).into());
        }
        f(&mut cache)
    }

    pub fn device(&self, device: DeviceId) -> Result<Arc<Mutex<DeviceCache>>, CacheError> {
        self.devices
            .read()
            .get(&device)
            .cloned()
            .ok_or(CacheError::DeviceNotFound(device))
    }

    pub fn is_attached(&self, device: DeviceId) -> bool {
        self.devices.read().contains_key(&device)
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<_> = self.devices.read().keys().copied().collect();
        devices.sort();
        devices
    }
}
