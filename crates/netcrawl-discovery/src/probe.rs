//! Single-device visit: platform detection, hostname and neighbor collection

use std::collections::HashMap;
use tracing::{debug, trace};

use netcrawl_core::parser::{self, summary_interfaces};
use netcrawl_core::template::NeighborTemplate;
use netcrawl_core::{
    normalize, CredentialStore, DeviceAddress, DeviceRecord, DiscoveryError, FrontierEntry,
    NeighborRecord, PlatformFamily, PlatformProfile, TemplateCorpus,
};
use netcrawl_session::{Connector, Session};

/// Result of a successful visit
#[derive(Debug, Clone)]
pub struct Visit {
    pub record: DeviceRecord,
    /// Normalized neighbors, empty when the device was not expanded
    pub neighbors: Vec<NeighborRecord>,
    /// Set when the device was identified but no neighbor command succeeded
    pub expansion_error: Option<DiscoveryError>,
}

/// Visit one device
///
/// Neighbors are only queried when `expand` is set. The session is closed
/// before returning on both success and failure.
pub async fn visit_device<C: Connector>(
    connector: &C,
    credentials: &CredentialStore,
    corpus: &TemplateCorpus,
    entry: &FrontierEntry,
    expand: bool,
) -> Result<Visit, DiscoveryError> {
    let creds = credentials.resolve(&entry.address)?;

    let hinted = entry
        .platform_hint
        .as_deref()
        .and_then(|hint| corpus.classify_hint(hint));
    if let (Some(hint), None) = (&entry.platform_hint, &hinted) {
        debug!(ip = %entry.address, hint = %hint, "Unrecognized platform hint, will probe");
    }

    let mut session = connector
        .connect(entry.address, creds, hinted.as_ref())
        .await?;

    let result = {
        let mut device = DeviceProbe::new(&mut session, entry.address);
        interrogate(&mut device, corpus, entry, hinted, expand).await
    };

    session.close().await;
    result
}

async fn interrogate<S: Session>(
    device: &mut DeviceProbe<'_, S>,
    corpus: &TemplateCorpus,
    entry: &FrontierEntry,
    hinted: Option<PlatformFamily>,
    expand: bool,
) -> Result<Visit, DiscoveryError> {
    let family = match hinted {
        Some(family) => family,
        None => identify_platform(device, corpus).await?,
    };
    let profile = corpus.profile(&family)?;

    if let Some(command) = profile.paging_command.as_deref() {
        if let Err(e) = device.run_checked(profile, command).await {
            debug!(ip = %entry.address, error = %e, "Could not turn off paging");
        }
    }

    let hostname = read_hostname(device, profile).await;
    debug!(ip = %entry.address, platform = %profile.family, hostname = %hostname, "Identified device");

    let record = DeviceRecord {
        address: entry.address,
        platform: profile.family.clone(),
        hostname,
        depth: entry.depth,
        discovered_via: entry.discovered_via,
    };

    if !expand {
        trace!(ip = %entry.address, depth = entry.depth, "At depth limit, not querying neighbors");
        return Ok(Visit {
            record,
            neighbors: Vec::new(),
            expansion_error: None,
        });
    }

    let (neighbors, expansion_error) = match collect_neighbors(device, profile).await {
        Ok(neighbors) => (neighbors, None),
        Err(e) => (Vec::new(), Some(e)),
    };

    Ok(Visit {
        record,
        neighbors,
        expansion_error,
    })
}

/// Session wrapper that runs each command at most once
struct DeviceProbe<'a, S: Session> {
    session: &'a mut S,
    address: DeviceAddress,
    outputs: HashMap<String, String>,
}

impl<'a, S: Session> DeviceProbe<'a, S> {
    fn new(session: &'a mut S, address: DeviceAddress) -> Self {
        Self {
            session,
            address,
            outputs: HashMap::new(),
        }
    }

    async fn run(&mut self, command: &str) -> Result<String, DiscoveryError> {
        if let Some(output) = self.outputs.get(command) {
            return Ok(output.clone());
        }
        let output = self.session.run(command).await?;
        self.outputs.insert(command.to_string(), output.clone());
        Ok(output)
    }

    /// Run a command and treat a CLI rejection as a command failure
    async fn run_checked(
        &mut self,
        profile: &PlatformProfile,
        command: &str,
    ) -> Result<String, DiscoveryError> {
        let output = self.run(command).await?;
        match profile.rejection(&output) {
            Some(line) => Err(DiscoveryError::Command {
                address: self.address,
                command: command.to_string(),
                reason: line,
            }),
            None => Ok(output),
        }
    }
}

/// Detect the platform family by running each distinct probe command once
async fn identify_platform<S: Session>(
    device: &mut DeviceProbe<'_, S>,
    corpus: &TemplateCorpus,
) -> Result<PlatformFamily, DiscoveryError> {
    let mut last_error = None;
    let mut answered = false;

    for command in corpus.probe_commands() {
        match device.run(command).await {
            Ok(output) => {
                answered = true;
                if let Some(family) = corpus.identify(command, &output) {
                    trace!(ip = %device.address, command = %command, platform = %family, "Probe matched");
                    return Ok(family);
                }
            }
            Err(e) => {
                trace!(ip = %device.address, command = %command, error = %e, "Probe command failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if !answered => Err(e),
        _ => Err(DiscoveryError::UnsupportedPlatform(format!(
            "no template matches probe output from {}",
            device.address
        ))),
    }
}

/// Read the hostname, empty when the command fails or the pattern finds nothing
async fn read_hostname<S: Session>(
    device: &mut DeviceProbe<'_, S>,
    profile: &PlatformProfile,
) -> String {
    let Some(command) = profile.hostname_command.as_deref() else {
        return String::new();
    };
    match device.run_checked(profile, command).await {
        Ok(output) => profile.hostname_from(&output).unwrap_or_default(),
        Err(e) => {
            debug!(ip = %device.address, error = %e, "Hostname lookup failed");
            String::new()
        }
    }
}

/// Run every neighbor template of the profile and normalize the combined list
///
/// Fails only when no neighbor command succeeded at all.
async fn collect_neighbors<S: Session>(
    device: &mut DeviceProbe<'_, S>,
    profile: &PlatformProfile,
) -> Result<Vec<NeighborRecord>, DiscoveryError> {
    let mut records = Vec::new();
    let mut last_error = None;
    let mut succeeded = 0;

    for template in &profile.neighbors {
        match query_table(device, profile, template).await {
            Ok(mut found) => {
                succeeded += 1;
                records.append(&mut found);
            }
            Err(e) => {
                debug!(
                    ip = %device.address,
                    protocol = %template.protocol,
                    error = %e,
                    "Neighbor query failed"
                );
                last_error = Some(e);
            }
        }
    }

    if succeeded == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    let neighbors = normalize(records);
    debug!(ip = %device.address, neighbors = neighbors.len(), "Collected neighbors");
    Ok(neighbors)
}

async fn query_table<S: Session>(
    device: &mut DeviceProbe<'_, S>,
    profile: &PlatformProfile,
    template: &NeighborTemplate,
) -> Result<Vec<NeighborRecord>, DiscoveryError> {
    let err = match device.run_checked(profile, &template.command).await {
        Ok(raw) => return parser::parse(&profile.family, template, &raw),
        Err(e) => e,
    };

    let rejected = matches!(err, DiscoveryError::Command { .. });
    let Some(fallback) = profile.fallback.as_ref().filter(|_| rejected) else {
        return Err(err);
    };

    debug!(
        ip = %device.address,
        command = %template.command,
        "Neighbor command rejected, querying per interface"
    );

    let summary = device.run_checked(profile, &fallback.summary_command).await?;
    let mut records = Vec::new();
    for interface in summary_interfaces(&summary) {
        let raw = device
            .run_checked(profile, &fallback.command_for(&interface))
            .await?;
        records.extend(parser::parse(&profile.family, template, &raw)?);
    }
    Ok(records)
}
