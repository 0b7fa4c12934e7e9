//! Multicast route entry types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Multicast route type: any-source `(*,G)` or source-specific `(S,G)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpmcEntryType {
    StarG,
    SourceG,
}

impl IpmcEntryType {
    /// Returns true if entries of this type carry a source address.
    pub const fn has_source(&self) -> bool {
        matches!(self, IpmcEntryType::SourceG)
    }
}

impl fmt::Display for IpmcEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpmcEntryType::StarG => write!(f, "(*,G)"),
            IpmcEntryType::SourceG => write!(f, "(S,G)"),
        }
    }
}
