//! Physical port identifiers used in replication-group member port lists.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A physical forwarding port: an npu/port pair or a LAG.
///
/// Textual form is `<npu>/<port>` for front-panel ports and `lag<id>` for
/// link aggregation groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicalPort {
    Port { npu: u32, port: u32 },
    Lag { lag_id: u32 },
}

impl PhysicalPort {
    pub const fn port(npu: u32, port: u32) -> Self {
        PhysicalPort::Port { npu, port }
    }

    pub const fn lag(lag_id: u32) -> Self {
        PhysicalPort::Lag { lag_id }
    }

    pub const fn is_lag(&self) -> bool {
        matches!(self, PhysicalPort::Lag { .. })
    }
}

impl fmt::Display for PhysicalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalPort::Port { npu, port } => write!(f, "{}/{}", npu, port),
            PhysicalPort::Lag { lag_id } => write!(f, "lag{}", lag_id),
        }
    }
}

impl FromStr for PhysicalPort {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPhysicalPort(s.to_string());

        if let Some(id) = s.strip_prefix("lag") {
            let lag_id = id.parse().map_err(|_| invalid())?;
            return Ok(PhysicalPort::Lag { lag_id });
        }

        let (npu, port) = s.split_once('/').ok_or_else(invalid)?;
        Ok(PhysicalPort::Port {
            npu: npu.parse().map_err(|_| invalid())?,
            port: port.parse().map_err(|_| invalid())?,
        })
    }
}

/// Normalized comparison set of member ports.
pub type PortSet = BTreeSet<PhysicalPort>;

/// Collapses a caller-supplied port list into a sorted, deduplicated set.
pub fn normalize_ports(ports: &[PhysicalPort]) -> PortSet {
    ports.iter().copied().collect()
}
