//! Device types for tracking discovered network infrastructure

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::str::FromStr;

use crate::platform::PlatformFamily;

/// Management address of a device, the identity key for deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(pub IpAddr);

impl DeviceAddress {
    pub fn ip(&self) -> IpAddr {
        self.0
    }

    /// Whether this address can plausibly be a peer management address.
    ///
    /// Neighbor tables sometimes advertise placeholder or scope-limited
    /// addresses that can never be dialed from the crawler.
    pub fn is_reachable_candidate(&self) -> bool {
        match self.0 {
            IpAddr::V4(v4) => {
                !(v4.is_unspecified()
                    || v4.is_loopback()
                    || v4.is_multicast()
                    || v4.is_broadcast())
            }
            IpAddr::V6(v6) => {
                !(v6.is_unspecified()
                    || v6.is_loopback()
                    || v6.is_multicast()
                    || (v6.segments()[0] & 0xffc0) == 0xfe80)
            }
        }
    }
}

impl From<IpAddr> for DeviceAddress {
    fn from(ip: IpAddr) -> Self {
        Self(ip)
    }
}

impl FromStr for DeviceAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<IpAddr>().map(Self)
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device that was connected to and identified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Management address the device was reached on
    pub address: DeviceAddress,
    /// Command-syntax family the device was driven with
    pub platform: PlatformFamily,
    /// Hostname reported by the device (empty if it could not be read)
    pub hostname: String,
    /// Hop count from the seed along the discovery graph
    pub depth: u32,
    /// Device whose neighbor table first reported this one
    pub discovered_via: Option<DeviceAddress>,
}

/// One entry of a device's neighbor table, not yet verified reachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborRecord {
    pub peer_address: DeviceAddress,
    /// Raw platform text the neighbor advertised (CDP platform, LLDP system description)
    pub peer_platform_hint: Option<String>,
    pub peer_hostname: Option<String>,
    /// Local port the neighbor was seen on
    pub local_interface: Option<String>,
}

impl NeighborRecord {
    pub fn new(peer_address: DeviceAddress) -> Self {
        Self {
            peer_address,
            peer_platform_hint: None,
            peer_hostname: None,
            local_interface: None,
        }
    }
}

/// A device awaiting a visit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub address: DeviceAddress,
    pub depth: u32,
    pub platform_hint: Option<String>,
    pub discovered_via: Option<DeviceAddress>,
}

impl FrontierEntry {
    /// The seed entry, the only one at depth 0
    pub fn seed(address: DeviceAddress) -> Self {
        Self {
            address,
            depth: 0,
            platform_hint: None,
            discovered_via: None,
        }
    }

    /// Entry for a neighbor reported by `parent`
    pub fn from_neighbor(parent: &FrontierEntry, neighbor: &NeighborRecord) -> Self {
        Self {
            address: neighbor.peer_address,
            depth: parent.depth + 1,
            platform_hint: neighbor.peer_platform_hint.clone(),
            discovered_via: Some(parent.address),
        }
    }
}

/// Ordered, append-only device inventory with one record per address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Inventory {
    records: Vec<DeviceRecord>,
    #[serde(skip)]
    index: HashSet<DeviceAddress>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returns false if the address is already present
    pub fn push(&mut self, record: DeviceRecord) -> bool {
        if !self.index.insert(record.address) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.index.contains(address)
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<&DeviceRecord> {
        self.records.iter().find(|r| &r.address == address)
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn addresses(&self) -> Vec<DeviceAddress> {
        self.records.iter().map(|r| r.address).collect()
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a DeviceRecord;
    type IntoIter = std::slice::Iter<'a, DeviceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
