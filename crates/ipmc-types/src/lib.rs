//! Common types for IP multicast replication-group orchestration.
//!
//! This crate provides the network primitives shared by the SAI gateway
//! and the orchestration layer:
//!
//! - [`IpAddress`]: IPv4/IPv6 tagged union with normalized byte keys
//! - [`AddressFamily`]: the family tag carried by every route key
//! - [`PhysicalPort`]: npu/port pair or LAG id used in member port lists
//! - [`IpmcEntryType`]: `(*,G)` / `(S,G)` route types
//! - [`DeviceId`], [`RifId`], [`VrfId`]: control-plane identifiers

mod entry;
mod ids;
mod ip;
mod port;

pub use entry::IpmcEntryType;
pub use ids::{DeviceId, RifId, VrfId};
pub use ip::{AddrBytes, AddressFamily, IpAddress};
pub use port::{normalize_ports, PhysicalPort, PortSet};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid physical port format: {0}")]
    InvalidPhysicalPort(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
