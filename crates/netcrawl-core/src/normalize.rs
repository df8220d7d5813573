//! Neighbor record normalization and deduplication
//!
//! Vendor output differs in quoting, padding and in how often the same peer
//! shows up (one entry per link, once per protocol). Everything the engine
//! enqueues passes through [`normalize`] first.

use std::collections::HashMap;
use tracing::trace;

use crate::device::NeighborRecord;

/// Clean up and deduplicate one device's combined neighbor list
///
/// - hostnames, hints and interfaces are trimmed and unquoted; empty becomes `None`
/// - addresses that can never be a peer management address are dropped
/// - duplicates collapse onto the first occurrence, which inherits any field
///   it was missing from later ones
pub fn normalize(records: Vec<NeighborRecord>) -> Vec<NeighborRecord> {
    let mut merged: Vec<NeighborRecord> = Vec::with_capacity(records.len());
    let mut positions = HashMap::with_capacity(records.len());

    for record in records {
        if !record.peer_address.is_reachable_candidate() {
            trace!(ip = %record.peer_address, "Dropping non-routable neighbor address");
            continue;
        }

        let record = NeighborRecord {
            peer_address: record.peer_address,
            peer_platform_hint: clean(record.peer_platform_hint),
            peer_hostname: clean(record.peer_hostname),
            local_interface: clean(record.local_interface),
        };

        match positions.get(&record.peer_address) {
            Some(&i) => {
                let existing: &mut NeighborRecord = &mut merged[i];
                if existing.peer_platform_hint.is_none() {
                    existing.peer_platform_hint = record.peer_platform_hint;
                }
                if existing.peer_hostname.is_none() {
                    existing.peer_hostname = record.peer_hostname;
                }
                if existing.local_interface.is_none() {
                    existing.local_interface = record.local_interface;
                }
            }
            None => {
                positions.insert(record.peer_address, merged.len());
                merged.push(record);
            }
        }
    }

    merged
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(addr: &str, hostname: Option<&str>, hint: Option<&str>) -> NeighborRecord {
        NeighborRecord {
            peer_address: addr.parse().unwrap(),
            peer_platform_hint: hint.map(str::to_string),
            peer_hostname: hostname.map(str::to_string),
            local_interface: None,
        }
    }

    #[test]
    fn test_dedup_keeps_first_order_and_merges() {
        let records = vec![
            neighbor("10.0.0.3", None, None),
            neighbor("10.0.0.2", Some("sw2"), None),
            neighbor("10.0.0.3", Some("sw3"), Some("Arista Networks EOS")),
            neighbor("10.0.0.2", Some("ignored"), Some("cisco WS-C3750")),
        ];

        let out = normalize(records);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].peer_address.to_string(), "10.0.0.3");
        assert_eq!(out[0].peer_hostname.as_deref(), Some("sw3"));
        assert_eq!(out[0].peer_platform_hint.as_deref(), Some("Arista Networks EOS"));
        assert_eq!(out[1].peer_hostname.as_deref(), Some("sw2"));
        assert_eq!(out[1].peer_platform_hint.as_deref(), Some("cisco WS-C3750"));
    }

    #[test]
    fn test_cleans_fields() {
        let out = normalize(vec![neighbor("10.0.0.2", Some("  \"veos-a1\" "), Some("   "))]);
        assert_eq!(out[0].peer_hostname.as_deref(), Some("veos-a1"));
        assert_eq!(out[0].peer_platform_hint, None);
    }

    #[test]
    fn test_drops_unusable_addresses() {
        let out = normalize(vec![
            neighbor("0.0.0.0", Some("a"), None),
            neighbor("127.0.0.1", Some("b"), None),
            neighbor("255.255.255.255", Some("c"), None),
            neighbor("fe80::1", Some("d"), None),
            neighbor("2001:db8::1", Some("e"), None),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].peer_hostname.as_deref(), Some("e"));
    }
}
