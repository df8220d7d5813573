//! Platform family tags

use serde::{Deserialize, Serialize};

/// Command-syntax family of a device (e.g. `cisco_ios`, `arista_eos`)
///
/// Families are plain tags keyed into the template corpus; a new vendor is a
/// new corpus entry, not a new type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformFamily(pub String);

impl PlatformFamily {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Neighbor discovery protocol whose table is queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborProtocol {
    Cdp,
    Lldp,
}

impl std::fmt::Display for NeighborProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cdp => write!(f, "cdp"),
            Self::Lldp => write!(f, "lldp"),
        }
    }
}
