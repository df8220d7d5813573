//! Neighbor-table parsing driven by corpus templates

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::OnceLock;
use tracing::{debug, trace};

use crate::device::{DeviceAddress, NeighborRecord};
use crate::error::DiscoveryError;
use crate::platform::PlatformFamily;
use crate::template::{BlockTemplate, NeighborTemplate, TemplateMode};

/// Parse raw neighbor-table output with one template
///
/// Records are returned in output order, without normalization.
pub fn parse(
    family: &PlatformFamily,
    template: &NeighborTemplate,
    raw: &str,
) -> Result<Vec<NeighborRecord>, DiscoveryError> {
    let records = match &template.mode {
        TemplateMode::Blocks(block) => parse_blocks(family, block, raw)?,
        TemplateMode::AddressScan => scan_addresses(raw),
    };
    debug!(
        platform = %family,
        protocol = %template.protocol,
        records = records.len(),
        "Parsed neighbor table"
    );
    Ok(records)
}

fn parse_blocks(
    family: &PlatformFamily,
    template: &BlockTemplate,
    raw: &str,
) -> Result<Vec<NeighborRecord>, DiscoveryError> {
    let starts: Vec<usize> = template.record_start.find_iter(raw).map(|m| m.start()).collect();

    let mut records = Vec::with_capacity(starts.len());
    let mut unparsed = None;
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(raw.len());
        let block = &raw[start..end];

        let Some(address_text) = capture(&template.address, block) else {
            trace!(platform = %family, "Neighbor record without management address, skipping");
            continue;
        };
        let Ok(peer_address) = address_text.parse::<DeviceAddress>() else {
            debug!(platform = %family, address = %address_text, "Neighbor address is not an IP, skipping");
            unparsed.get_or_insert(address_text);
            continue;
        };

        records.push(NeighborRecord {
            peer_address,
            peer_platform_hint: template.platform.as_ref().and_then(|re| capture(re, block)),
            peer_hostname: template.hostname.as_ref().and_then(|re| capture(re, block)),
            local_interface: template.interface.as_ref().and_then(|re| capture(re, block)),
        });
    }

    // Only an error when nothing in the table was usable
    match unparsed {
        Some(address_text) if records.is_empty() => Err(DiscoveryError::Parse {
            platform: family.clone(),
            reason: format!("'{}' is not an IP address", address_text),
        }),
        _ => Ok(records),
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn ipv4_literal() -> &'static Regex {
    static IPV4: OnceLock<Regex> = OnceLock::new();
    IPV4.get_or_init(|| {
        Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPv4 literal pattern is valid")
    })
}

/// Every valid IPv4 literal in the output, in order of appearance
fn scan_addresses(raw: &str) -> Vec<NeighborRecord> {
    ipv4_literal()
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<Ipv4Addr>().ok())
        .map(|ip| NeighborRecord::new(DeviceAddress(ip.into())))
        .collect()
}

/// Local interface names from a neighbor summary table
///
/// The first column of every non-header line is taken as the interface.
pub fn summary_interfaces(output: &str) -> Vec<String> {
    let mut interfaces: Vec<String> = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Local Interface") {
            continue;
        }
        if let Some(first) = trimmed.split_whitespace().next() {
            if !interfaces.iter().any(|i| i == first) {
                interfaces.push(first.to_string());
            }
        }
    }
    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NeighborProtocol;
    use crate::template::TemplateCorpus;

    const ARISTA_LLDP: &str = r#"Last table change time   : 0:02:11 ago
Number of table inserts  : 2

Interface Ethernet1 detected 1 LLDP neighbors:

  Neighbor 5254.0012.3456/Ethernet1, age 3 seconds
  Discovered 0:02:11 ago; Last changed 0:02:11 ago
  - Chassis ID type: MAC address (4)
    Chassis ID     : 5254.0012.3456
  - Port ID type: Interface name (5)
    Port ID     : "Ethernet1"
  - System Name: "veos-a1"
  - System Description: "Arista Networks EOS version 4.27.0F running on an Arista Networks vEOS-lab"
  - Management Address Subtype: IPv4 (1)
    Management Address        : 192.168.122.203

Interface Ethernet2 detected 1 LLDP neighbors:

  Neighbor 5254.00ab.cdef/Ethernet1, age 8 seconds
  - System Name: "veos-b2"
  - System Description: "Arista Networks EOS version 4.27.0F running on an Arista Networks vEOS-lab"
  - Management Address Subtype: IPv4 (1)
    Management Address        : 192.168.122.202

Interface Ethernet3 detected 1 LLDP neighbors:

  Neighbor 0050.56aa.0001/eth0, age 12 seconds
  - System Name: "lab-server"
  - Management Address Subtype: all802 (6)
    Management Address        : 0050.56aa.0001
"#;

    const CISCO_CDP: &str = r#"
-------------------------
Device ID: R2.lab.local
Entry address(es):
  IP address: 10.0.12.2
Platform: Cisco 2911,  Capabilities: Router Switch IGMP
Interface: GigabitEthernet0/0,  Port ID (outgoing port): GigabitEthernet0/1
Holdtime : 132 sec

Version :
Cisco IOS Software, C2900 Software (C2900-UNIVERSALK9-M), Version 15.4(3)M3

-------------------------
Device ID: SEP001122334455
Entry address(es):
Platform: Cisco IP Phone 7945,  Capabilities: Host Phone
Interface: GigabitEthernet0/2,  Port ID (outgoing port): Port 1
"#;

    const JUNOS_LLDP: &str = r#"LLDP Neighbor Information:
Local Information:
Index: 2 Time to live: 120 Time mark: Mon Jan  8 10:02:11 2024 Age: 8 secs
Local Interface    : ge-0/0/0
Parent Interface   : -
Local Port ID      : 513

Neighbour Information:
Chassis type       : Mac address
Chassis ID         : 52:54:00:12:34:56
Port type          : Interface name
Port ID            : Ethernet1
System name        : veos-a1

System Description : Arista Networks EOS version 4.27.0F running on an Arista Networks vEOS-lab

Address Type       : IPv4
Address            : 192.168.122.203
"#;

    fn corpus() -> TemplateCorpus {
        TemplateCorpus::builtin().unwrap()
    }

    #[test]
    fn test_parse_arista_lldp() {
        let records = corpus()
            .parse(&PlatformFamily::new("arista_eos"), NeighborProtocol::Lldp, ARISTA_LLDP)
            .unwrap();

        // The third neighbor only advertises a MAC management address
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].peer_address.to_string(), "192.168.122.203");
        assert_eq!(records[0].peer_hostname.as_deref(), Some("veos-a1"));
        assert_eq!(records[0].local_interface.as_deref(), Some("Ethernet1"));
        assert!(records[0]
            .peer_platform_hint
            .as_deref()
            .unwrap()
            .starts_with("Arista Networks EOS"));
        assert_eq!(records[1].peer_address.to_string(), "192.168.122.202");
        assert_eq!(records[1].peer_hostname.as_deref(), Some("veos-b2"));
    }

    #[test]
    fn test_parse_cisco_cdp() {
        let records = corpus()
            .parse(&PlatformFamily::new("cisco_ios"), NeighborProtocol::Cdp, CISCO_CDP)
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].peer_address.to_string(), "10.0.12.2");
        assert_eq!(records[0].peer_hostname.as_deref(), Some("R2.lab.local"));
        assert_eq!(records[0].peer_platform_hint.as_deref(), Some("Cisco 2911"));
        assert_eq!(records[0].local_interface.as_deref(), Some("GigabitEthernet0/0"));
    }

    #[test]
    fn test_parse_junos_lldp_via_alias() {
        let records = corpus()
            .parse(&PlatformFamily::new("juniper_junos"), NeighborProtocol::Lldp, JUNOS_LLDP)
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].peer_address.to_string(), "192.168.122.203");
        assert_eq!(records[0].peer_hostname.as_deref(), Some("veos-a1"));
        assert_eq!(records[0].local_interface.as_deref(), Some("ge-0/0/0"));
    }

    #[test]
    fn test_malformed_address_is_parse_error() {
        let raw = "Device ID: R9\n  IP address: 10.0.0.999\nPlatform: Cisco 891,  Capabilities: Router\n";
        let err = corpus()
            .parse(&PlatformFamily::new("cisco_ios"), NeighborProtocol::Cdp, raw)
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_bad_address_skips_only_its_record() {
        let second = JUNOS_LLDP
            .replace("ge-0/0/0", "ge-0/0/1")
            .replace("veos-a1", "lab-server")
            .replace("Address            : 192.168.122.203", "Address            : 00:50:56:aa:00:01");
        let raw = format!("{JUNOS_LLDP}\n{second}");

        let records = corpus()
            .parse(&PlatformFamily::new("juniper"), NeighborProtocol::Lldp, &raw)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].peer_address.to_string(), "192.168.122.203");
        assert_eq!(records[0].local_interface.as_deref(), Some("ge-0/0/0"));

        // With only the bad record left the table is unusable
        let err = corpus()
            .parse(&PlatformFamily::new("juniper"), NeighborProtocol::Lldp, &second)
            .unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::Parse {
                platform: PlatformFamily::new("juniper"),
                reason: "'00:50:56:aa:00:01' is not an IP address".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_output_has_no_neighbors() {
        let records = corpus()
            .parse(&PlatformFamily::new("cisco_ios"), NeighborProtocol::Cdp, "")
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_address_scan() {
        let raw = "Local Interface  Chassis Id  Port info  System Name  Mgmt\n\
                   ethernet1/1      00:1b:17:00:01:10  eth0  fw-peer  10.10.10.2\n\
                   ethernet1/2      00:1b:17:00:01:11  eth1  sw-core  10.10.10.3 999.1.1.1\n";
        let records = corpus()
            .parse(&PlatformFamily::new("paloalto_panos"), NeighborProtocol::Lldp, raw)
            .unwrap();
        let addrs: Vec<String> = records.iter().map(|r| r.peer_address.to_string()).collect();
        assert_eq!(addrs, vec!["10.10.10.2", "10.10.10.3"]);
        assert!(records[0].peer_hostname.is_none());
    }

    #[test]
    fn test_summary_interfaces() {
        let summary = "Local Interface    Parent Interface    Chassis Id          Port info          System Name\n\
                       ge-0/0/0           -                   52:54:00:12:34:56   Ethernet1          veos-a1\n\
                       ge-0/0/1           -                   52:54:00:ab:cd:ef   Ethernet1          veos-b2\n\
                       ge-0/0/0           -                   52:54:00:99:99:99   Ethernet2          veos-c1\n\n";
        assert_eq!(summary_interfaces(summary), vec!["ge-0/0/0", "ge-0/0/1"]);
    }
}
