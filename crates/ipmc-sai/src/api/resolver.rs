//! Handle resolution for ports, router interfaces and VRFs.
//!
//! Member port lists arrive as logical ports and LAGs; the hardware wants
//! bridge-port handles. Lookups are owned by the port/interface layers and
//! only consumed here.

use crate::error::{SaiError, SaiResult};
use crate::types::{BridgePortOid, RouterInterfaceOid, VirtualRouterOid};
use ipmc_types::{DeviceId, PhysicalPort, RifId, VrfId};

pub trait PortResolver: Send + Sync {
    fn bridge_port(&self, device: DeviceId, port: PhysicalPort) -> Option<BridgePortOid>;

    fn router_interface(&self, device: DeviceId, rif: RifId) -> Option<RouterInterfaceOid>;

    fn virtual_router(&self, device: DeviceId, vrf: VrfId) -> Option<VirtualRouterOid>;
}

/// Resolves every port in caller order; the first miss fails the whole list.
pub fn resolve_bridge_ports(
    resolver: &dyn PortResolver,
    device: DeviceId,
    ports: &[PhysicalPort],
) -> SaiResult<Vec<BridgePortOid>> {
    ports
        .iter()
        .map(|port| {
            resolver
                .bridge_port(device, *port)
                .ok_or_else(|| SaiError::not_found(format!("bridge port for {}", port)))
        })
        .collect()
}

pub fn resolve_router_interface(
    resolver: &dyn PortResolver,
    device: DeviceId,
    rif: RifId,
) -> SaiResult<RouterInterfaceOid> {
    resolver
        .router_interface(device, rif)
        .ok_or_else(|| SaiError::not_found(format!("router interface {}", rif)))
}

pub fn resolve_virtual_router(
    resolver: &dyn PortResolver,
    device: DeviceId,
    vrf: VrfId,
) -> SaiResult<VirtualRouterOid> {
    resolver
        .virtual_router(device, vrf)
        .ok_or_else(|| SaiError::not_found(format!("virtual router for vrf {}", vrf)))
}
