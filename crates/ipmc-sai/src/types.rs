//! Type-safe SAI object ID wrappers for the IPMC object model.
//!
//! A replication group, its RPF and IPMC sub-groups, and their members are
//! all plain `sai_object_id_t` values on the wire. The phantom kind keeps an
//! RPF member handle from being passed where an IPMC member is expected.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw SAI object ID type (matches sai_object_id_t in C).
pub type RawSaiObjectId = u64;

/// Marker trait for SAI object kinds.
pub trait SaiObjectKind: Send + Sync + 'static {
    /// Returns the SAI object type name for debugging.
    fn type_name() -> &'static str;
}

/// A type-safe SAI object ID.
///
/// # Examples
///
/// ```
/// use ipmc_sai::{IpmcGroupOid, RpfGroupOid};
///
/// let ipmc = IpmcGroupOid::from_raw(0x2a00_0000_0001).unwrap();
/// let rpf = RpfGroupOid::from_raw(0x2c00_0000_0001).unwrap();
///
/// // fn takes_rpf(g: RpfGroupOid) {}
/// // takes_rpf(ipmc);  // Error: expected RpfGroupOid, found IpmcGroupOid
/// assert!(ipmc.is_valid() && rpf.is_valid());
/// ```
pub struct SaiObjectId<T: SaiObjectKind> {
    raw: RawSaiObjectId,
    _marker: PhantomData<T>,
}

impl<T: SaiObjectKind> SaiObjectId<T> {
    /// The null object ID (SAI_NULL_OBJECT_ID).
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Returns `None` for the null object ID.
    pub fn from_raw(raw: RawSaiObjectId) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self::from_raw_unchecked(raw))
        }
    }

    pub const fn from_raw_unchecked(raw: RawSaiObjectId) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn as_raw(&self) -> RawSaiObjectId {
        self.raw
    }

    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }

    pub const fn is_valid(&self) -> bool {
        self.raw != 0
    }
}

// Manual impls: derives would put bounds on the phantom kind.
impl<T: SaiObjectKind> Clone for SaiObjectId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: SaiObjectKind> Copy for SaiObjectId<T> {}

impl<T: SaiObjectKind> fmt::Debug for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", T::type_name(), self.raw)
    }
}

impl<T: SaiObjectKind> fmt::Display for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.raw)
    }
}

impl<T: SaiObjectKind> PartialEq for SaiObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: SaiObjectKind> Eq for SaiObjectId<T> {}

impl<T: SaiObjectKind> PartialOrd for SaiObjectId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: SaiObjectKind> Ord for SaiObjectId<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: SaiObjectKind> Hash for SaiObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: SaiObjectKind> Default for SaiObjectId<T> {
    fn default() -> Self {
        Self::NULL
    }
}

// Serialized in the same hex form as Display, for dumps.
impl<T: SaiObjectKind> Serialize for SaiObjectId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $oid_alias:ident) => {
        #[doc = concat!("Marker type for SAI ", $type_name, " objects.")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl SaiObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Object ID of a SAI ", $type_name, ".")]
        pub type $oid_alias = SaiObjectId<$name>;
    };
}

define_object_kind!(VirtualRouterKind, "VirtualRouter", VirtualRouterOid);
define_object_kind!(RouterInterfaceKind, "RouterInterface", RouterInterfaceOid);
define_object_kind!(BridgePortKind, "BridgePort", BridgePortOid);
define_object_kind!(ReplGroupKind, "ReplGroup", ReplGroupOid);
define_object_kind!(IpmcGroupKind, "IpmcGroup", IpmcGroupOid);
define_object_kind!(IpmcGroupMemberKind, "IpmcGroupMember", IpmcGroupMemberOid);
define_object_kind!(RpfGroupKind, "RpfGroup", RpfGroupOid);
define_object_kind!(RpfGroupMemberKind, "RpfGroupMember", RpfGroupMemberOid);
