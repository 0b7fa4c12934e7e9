//! Type-safe SAI bindings for IP multicast replication.
//!
//! The crate models the SAI objects an IPMC route needs: a top-level
//! replication group, its RPF and IPMC sub-groups, their members and the
//! IPMC route entries that point at them.
//!
//! - [`types`]: typed object IDs
//! - [`error`]: status codes and error handling
//! - [`api`]: the [`IpmcApi`] gateway and [`PortResolver`] lookups
//! - [`sim`]: an in-memory switch implementing both traits
//!
//! # Example
//!
//! ```
//! use ipmc_sai::sim::SimSai;
//! use ipmc_sai::{IpmcApi, ReplGroupAttribute, ReplGroupOwner, SubGroupAttribute};
//! use ipmc_types::DeviceId;
//!
//! let sai = SimSai::new();
//! let dev = DeviceId::new(0);
//! let group = sai
//!     .create_repl_group(dev, &[ReplGroupAttribute::Owner(ReplGroupOwner::Ipmc)])
//!     .unwrap();
//! let rpf = sai
//!     .create_rpf_group(dev, &[SubGroupAttribute::ReplGroup(group)])
//!     .unwrap();
//! assert!(rpf.is_valid());
//! ```

pub mod api;
pub mod error;
pub mod sim;
pub mod types;

pub use types::{
    BridgePortKind, BridgePortOid, IpmcGroupKind, IpmcGroupMemberKind, IpmcGroupMemberOid,
    IpmcGroupOid, RawSaiObjectId, ReplGroupKind, ReplGroupOid, RouterInterfaceKind,
    RouterInterfaceOid, RpfGroupKind, RpfGroupMemberKind, RpfGroupMemberOid, RpfGroupOid,
    SaiObjectId, SaiObjectKind, VirtualRouterKind, VirtualRouterOid,
};

pub use api::{
    resolve_bridge_ports, resolve_router_interface, resolve_virtual_router, GroupMemberAttribute,
    IpmcApi, IpmcEntry, IpmcEntryAttrId, IpmcEntryAttribute, IpmcGroupMemberAttribute,
    PacketAction, PortResolver, ReplGroupAttribute, ReplGroupOwner, RpfGroupMemberAttribute,
    SubGroupAttribute,
};

pub use error::{SaiError, SaiResult, SaiStatus};
