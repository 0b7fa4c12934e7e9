//! IPMC replication group orchestration.
//!
//! This crate keeps the replication groups and IPMC routes of one or more
//! switch devices programmed through the SAI gateway and mirrored in a
//! per-device cache.
//!
//! # Architecture
//!
//! ```text
//! [control plane] ──> [ReplGroupOrch] ──> [IpmcApi] ──> [ASIC]
//!                           │
//!                           ↓
//!                   [ReplGroupCache] (one DeviceCache per device)
//! ```
//!
//! # Key Components
//!
//! - [`repl_group::ReplGroupOrch`]: group, membership and route operations
//! - [`repl_group::ReplGroupCache`]: device registry and per-device state
//! - [`audit`]: structured audit records for every state change
//! - [`config`]: JSON configuration loading

pub mod audit;
pub mod config;
pub mod repl_group;
pub mod sync_map;

pub use config::{load_config, ConfigError};
pub use repl_group::{
    CacheError, CacheSnapshot, CachedRouteEntry, ErrorKind, MemberOp, MemberRole, MemberSpec,
    ReplGroupError, ReplGroupOrch, ReplGroupOrchConfig, ReplGroupStats, ReplicationGroup,
    RouteKey, RouteUpdate,
};
pub use sync_map::{SyncMap, SyncMapError};

pub use ipmc_sai::{PacketAction, ReplGroupOid, ReplGroupOwner, SaiError, SaiStatus};
pub use ipmc_types::{DeviceId, IpAddress, IpmcEntryType, PhysicalPort, RifId, VrfId};
