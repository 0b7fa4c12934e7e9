//! ReplGroupOrch - Multicast replication group orchestration.
//!
//! A replication group bundles one RPF group (the accepted ingress
//! interface) with one IPMC group (the outgoing interfaces). IPMC routes
//! reference a group; the group cannot be removed while any route does.
//!
//! State is cached per device, each device behind its own lock:
//! - [`ReplGroupTable`]: groups keyed by hardware handle
//! - [`RouteEntryIndex`]: route key to owning group, both address families
//!
//! Like the rest of the orch layer, lookups go through `SyncMap` and fail
//! with an error instead of creating missing entries.

mod cache;
mod members;
mod orch;
mod rollback;
mod route_index;
mod table;
mod types;

pub use cache::{CacheError, CacheSnapshot, DeviceCache, GroupSnapshot, ReplGroupCache};
pub use members::GroupMemberSet;
pub use orch::{ErrorKind, ReplGroupError, ReplGroupOrch, ReplGroupOrchConfig, ReplGroupStats, Result};
pub use route_index::RouteEntryIndex;
pub use table::ReplGroupTable;
pub use types::{
    CachedRouteEntry, GroupMember, MemberOp, MemberRole, MemberSpec, ReplicationGroup, RouteKey,
    RouteUpdate,
};
