//! IP address tagged union keyed by normalized address bytes.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family of an IP address or route key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Number of address bytes for this family.
    pub const fn addr_len(&self) -> usize {
        match self {
            AddressFamily::Ipv4 => 4,
            AddressFamily::Ipv6 => 16,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Normalized byte form of an address.
///
/// IPv4 addresses occupy the first four bytes; the remainder is zeroed so
/// that two addresses compare equal iff family and bytes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrBytes {
    family: AddressFamily,
    buf: [u8; 16],
}

impl AddrBytes {
    pub const fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.family.addr_len()]
    }
}

/// An IP address that can be either IPv4 or IPv6.
///
/// Hashing goes through [`AddrBytes`], so route keys built from this type
/// share one index across both families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpAddress {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddress {
    pub const fn family(&self) -> AddressFamily {
        match self {
            IpAddress::V4(_) => AddressFamily::Ipv4,
            IpAddress::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Returns true for 224.0.0.0/4 and ff00::/8.
    pub const fn is_multicast(&self) -> bool {
        match self {
            IpAddress::V4(addr) => addr.is_multicast(),
            IpAddress::V6(addr) => addr.is_multicast(),
        }
    }

    pub const fn is_unspecified(&self) -> bool {
        match self {
            IpAddress::V4(addr) => addr.is_unspecified(),
            IpAddress::V6(addr) => addr.is_unspecified(),
        }
    }

    /// Returns the normalized byte form used for hashing.
    pub fn to_bytes(&self) -> AddrBytes {
        let mut buf = [0u8; 16];
        match self {
            IpAddress::V4(addr) => buf[..4].copy_from_slice(&addr.octets()),
            IpAddress::V6(addr) => buf.copy_from_slice(&addr.octets()),
        }
        AddrBytes {
            family: self.family(),
            buf,
        }
    }
}

impl Hash for IpAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(IpAddress::from)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(addr)
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IpAddress::V4(v4),
            IpAddr::V6(v6) => IpAddress::V6(v6),
        }
    }
}

impl From<IpAddress> for IpAddr {
    fn from(addr: IpAddress) -> Self {
        match addr {
            IpAddress::V4(v4) => IpAddr::V4(v4),
            IpAddress::V6(v6) => IpAddr::V6(v6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(addr: &IpAddress) -> u64 {
        let mut hasher = DefaultHasher::new();
        addr.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_parse_and_family() {
        let v4: IpAddress = "230.1.1.1".parse().unwrap();
        assert_eq!(v4.family(), AddressFamily::Ipv4);
        assert!(v4.is_multicast());

        let v6: IpAddress = "ff0e::1".parse().unwrap();
        assert_eq!(v6.family(), AddressFamily::Ipv6);
        assert!(v6.is_multicast());

        assert!("230.1.1".parse::<IpAddress>().is_err());
    }

    #[test]
    fn test_unicast_is_not_multicast() {
        let v4: IpAddress = "10.0.0.1".parse().unwrap();
        assert!(!v4.is_multicast());
        let v6: IpAddress = "2001:db8::1".parse().unwrap();
        assert!(!v6.is_multicast());
    }

    #[test]
    fn test_bytes_are_normalized_per_family() {
        let v4: IpAddress = "230.1.1.1".parse().unwrap();
        assert_eq!(v4.to_bytes().as_slice(), &[230, 1, 1, 1]);

        // ::e601:101 carries the same low bytes but must not collide.
        let v6: IpAddress = "::e601:101".parse().unwrap();
        assert_ne!(v4.to_bytes(), v6.to_bytes());
        assert_eq!(v6.to_bytes().as_slice().len(), 16);
    }

    #[test]
    fn test_hash_matches_equality() {
        let a: IpAddress = "230.1.1.1".parse().unwrap();
        let b = IpAddress::from(Ipv4Addr::new(230, 1, 1, 1));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_display_round_trip() {
        let addr: IpAddress = "ff02::1:3".parse().unwrap();
        assert_eq!(addr.to_string(), "ff02::1:3");
        assert_eq!(AddressFamily::Ipv6.to_string(), "ipv6");
    }
}
