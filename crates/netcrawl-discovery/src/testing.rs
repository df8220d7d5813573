//! In-memory lab network for engine tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netcrawl_core::{Credentials, DeviceAddress, DiscoveryError, PlatformFamily};
use netcrawl_session::{Connector, Session};

pub const EOS: &str = "Arista Networks EOS version 4.27.0F running on an Arista Networks vEOS-lab";
pub const JUNOS: &str = "Juniper Networks, Inc. vmx internet router, kernel JUNOS 21.4R1.12";
pub const IOS: &str = "Cisco 2911";
pub const LINUX: &str = "Linux lab-server 5.15.0-91-generic";

const EOS_REJECT: &str = "% Invalid input detected at '^' marker.\n";
const IOS_REJECT: &str = "                ^\n% Invalid input detected at '^' marker.\n";
const JUNOS_REJECT: &str = "                          ^\nsyntax error, expecting <command>.\n";

/// (management address, hostname, system description)
pub type Peer<'a> = (&'a str, &'a str, &'a str);

pub fn addr(s: &str) -> DeviceAddress {
    s.parse().unwrap()
}

#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    responses: HashMap<String, String>,
    failing: HashMap<String, String>,
    unknown: String,
    refuse: Option<String>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct FakeStats {
    pub connects: Vec<DeviceAddress>,
    pub hinted: Vec<(DeviceAddress, Option<PlatformFamily>)>,
    pub commands: Vec<(DeviceAddress, String)>,
    pub closes: usize,
    pub active: usize,
    pub max_active: usize,
}

impl FakeStats {
    pub fn commands_for(&self, address: &str) -> Vec<String> {
        let address = addr(address);
        self.commands
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct FakeNetwork {
    devices: HashMap<DeviceAddress, FakeDevice>,
    pub stats: Arc<Mutex<FakeStats>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&mut self, ip: &str) -> &mut FakeDevice {
        self.devices.entry(addr(ip)).or_default()
    }

    pub fn arista(mut self, ip: &str, hostname: &str, peers: &[Peer]) -> Self {
        let device = self.device(ip);
        device.unknown = EOS_REJECT.to_string();
        device.responses.insert(
            "show version".into(),
            "Arista vEOS-lab\nHardware version:\nSoftware image version: 4.27.0F\n".into(),
        );
        device.responses.insert(
            "show hostname".into(),
            format!("Hostname: {hostname}\nFQDN:     {hostname}.lab\n"),
        );
        device
            .responses
            .insert("show lldp neighbors detail".into(), arista_lldp(peers));
        self
    }

    pub fn cisco(mut self, ip: &str, hostname: &str, peers: &[Peer]) -> Self {
        let device = self.device(ip);
        device.unknown = IOS_REJECT.to_string();
        device.responses.insert(
            "show version".into(),
            format!(
                "Cisco IOS Software, C2900 Software (C2900-UNIVERSALK9-M), Version 15.4(3)M3\n\
                 {hostname} uptime is 3 weeks, 2 days\n"
            ),
        );
        device
            .responses
            .insert("show cdp neighbors detail".into(), cisco_cdp(peers));
        self
    }

    /// Junos device whose `show lldp neighbors detail` is rejected
    pub fn juniper(mut self, ip: &str, hostname: &str, peers: &[Peer]) -> Self {
        let device = self.device(ip);
        device.unknown = JUNOS_REJECT.to_string();
        device.responses.insert(
            "show version".into(),
            format!("Hostname: {hostname}\nModel: vmx\nJunos: 21.4R1.12\n"),
        );
        let mut summary = String::from(
            "Local Interface    Parent Interface    Chassis Id          Port info          System Name\n",
        );
        for (i, (peer_ip, peer_host, desc)) in peers.iter().enumerate() {
            summary.push_str(&format!(
                "ge-0/0/{i}           -                   52:54:00:00:00:{i:02x}   Ethernet1          {peer_host}\n"
            ));
            device.responses.insert(
                format!("show lldp neighbors interface ge-0/0/{i}"),
                format!(
                    "LLDP Neighbor Information:\nLocal Information:\nLocal Interface    : ge-0/0/{i}\n\n\
                     Neighbour Information:\nSystem name        : {peer_host}\n\
                     System Description : {desc}\n\nAddress Type       : IPv4\n\
                     Address            : {peer_ip}\n"
                ),
            );
        }
        device.responses.insert("show lldp neighbors".into(), summary);
        self
    }

    /// Device that refuses connections
    pub fn unreachable(mut self, ip: &str, reason: &str) -> Self {
        self.device(ip).refuse = Some(reason.to_string());
        self
    }

    /// Delay every connection to `ip`
    pub fn slow(mut self, ip: &str, delay: Duration) -> Self {
        self.device(ip).delay = Some(delay);
        self
    }

    pub fn respond(mut self, ip: &str, command: &str, output: &str) -> Self {
        self.device(ip)
            .responses
            .insert(command.to_string(), output.to_string());
        self
    }

    /// Make `command` exit non-zero on `ip`
    pub fn fail(mut self, ip: &str, command: &str, reason: &str) -> Self {
        self.device(ip)
            .failing
            .insert(command.to_string(), reason.to_string());
        self
    }
}

fn arista_lldp(peers: &[Peer]) -> String {
    let mut out = String::from("Last table change time   : 0:02:11 ago\n\n");
    for (i, (ip, host, desc)) in peers.iter().enumerate() {
        out.push_str(&format!(
            "Interface Ethernet{n} detected 1 LLDP neighbors:\n\n\
             \x20 Neighbor 5254.0000.00{i:02x}/Ethernet1, age 3 seconds\n\
             \x20 - System Name: \"{host}\"\n\
             \x20 - System Description: \"{desc}\"\n\
             \x20 - Management Address Subtype: IPv4 (1)\n\
             \x20   Management Address        : {ip}\n\n",
            n = i + 1
        ));
    }
    out
}

fn cisco_cdp(peers: &[Peer]) -> String {
    let mut out = String::new();
    for (i, (ip, host, desc)) in peers.iter().enumerate() {
        out.push_str(&format!(
            "-------------------------\nDevice ID: {host}\nEntry address(es):\n  IP address: {ip}\n\
             Platform: {desc},  Capabilities: Router Switch IGMP\n\
             Interface: GigabitEthernet0/{i},  Port ID (outgoing port): GigabitEthernet0/1\n\
             Holdtime : 132 sec\n\n"
        ));
    }
    out
}

pub struct FakeSession {
    address: DeviceAddress,
    device: FakeDevice,
    stats: Arc<Mutex<FakeStats>>,
}

#[async_trait]
impl Connector for FakeNetwork {
    type Session = FakeSession;

    async fn connect(
        &self,
        address: DeviceAddress,
        _credentials: &Credentials,
        platform: Option<&PlatformFamily>,
    ) -> Result<FakeSession, DiscoveryError> {
        {
            let mut stats = self.stats.lock().unwrap();
            stats.connects.push(address);
            stats.hinted.push((address, platform.cloned()));
            stats.active += 1;
            stats.max_active = stats.max_active.max(stats.active);
        }

        let device = self.devices.get(&address).cloned();
        if let Some(delay) = device.as_ref().and_then(|d| d.delay) {
            tokio::time::sleep(delay).await;
        }

        let refused = match &device {
            None => Some("No route to host".to_string()),
            Some(d) => d.refuse.clone(),
        };
        match (device, refused) {
            (Some(device), None) => Ok(FakeSession {
                address,
                device,
                stats: self.stats.clone(),
            }),
            (_, reason) => {
                self.stats.lock().unwrap().active -= 1;
                Err(DiscoveryError::Connection {
                    address,
                    reason: reason.unwrap_or_default(),
                })
            }
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn run(&mut self, command: &str) -> Result<String, DiscoveryError> {
        self.stats
            .lock()
            .unwrap()
            .commands
            .push((self.address, command.to_string()));

        if let Some(reason) = self.device.failing.get(command) {
            return Err(DiscoveryError::Command {
                address: self.address,
                command: command.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .device
            .responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| self.device.unknown.clone()))
    }

    async fn close(self) {
        let mut stats = self.stats.lock().unwrap();
        stats.closes += 1;
        stats.active -= 1;
    }
}

/// Store with one default login for every address
pub fn lab_credentials() -> netcrawl_core::CredentialStore {
    netcrawl_core::CredentialStore::new(Some(Credentials::password("admin", "admin")))
}
