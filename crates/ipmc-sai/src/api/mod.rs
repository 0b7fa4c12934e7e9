//! Safe wrappers for the SAI APIs this layer programs.
//!
//! - [`ipmc`]: replication groups, RPF/IPMC groups, members and IPMC entries
//! - [`resolver`]: bridge-port, router-interface and VRF handle lookups

pub mod ipmc;
pub mod resolver;

pub use ipmc::{
    GroupMemberAttribute, IpmcApi, IpmcEntry, IpmcEntryAttrId, IpmcEntryAttribute,
    IpmcGroupMemberAttribute, PacketAction, ReplGroupAttribute, ReplGroupOwner,
    RpfGroupMemberAttribute, SubGroupAttribute,
};
pub use resolver::{
    resolve_bridge_ports, resolve_router_interface, resolve_virtual_router, PortResolver,
};
