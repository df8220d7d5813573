//! Platform template corpus - maps platform families to probe signatures,
//! hostname extraction, and neighbor-table templates
//!
//! The corpus is a TOML document. A built-in copy covering Cisco IOS, Arista
//! EOS, Juniper, PAN-OS and Ubiquiti Edge is embedded in the crate; operators
//! can replace it with their own file.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::device::NeighborRecord;
use crate::error::DiscoveryError;
use crate::parser;
use crate::platform::{NeighborProtocol, PlatformFamily};

const BUILTIN_CORPUS: &str = include_str!("../templates/default.toml");

/// Placeholder substituted into fallback interface commands
pub const INTERFACE_PLACEHOLDER: &str = "{interface}";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template corpus: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse template corpus: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid pattern for {platform}.{field}: {source}")]
    InvalidPattern {
        platform: String,
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("Platform '{0}' is defined more than once")]
    DuplicatePlatform(String),
    #[error("Alias '{alias}' points at unknown platform '{target}'")]
    UnknownAlias { alias: String, target: String },
    #[error("Template for {platform} ({protocol}) is missing '{field}'")]
    MissingField {
        platform: String,
        protocol: NeighborProtocol,
        field: &'static str,
    },
    #[error("Fallback interface command for {0} must contain {{interface}}")]
    BadFallback(String),
}

// ---------------------------------------------------------------------------
// File format

#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    aliases: HashMap<String, String>,
    #[serde(default)]
    platform: Vec<PlatformEntry>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Deserialize)]
struct PlatformEntry {
    name: String,
    probe_command: String,
    #[serde(default)]
    paging_command: Option<String>,
    #[serde(default)]
    signatures: Vec<String>,
    #[serde(default)]
    hint_patterns: Vec<String>,
    #[serde(default)]
    hostname_command: Option<String>,
    #[serde(default)]
    hostname_pattern: Option<String>,
    #[serde(default)]
    error_patterns: Vec<String>,
    #[serde(default)]
    neighbor: Vec<NeighborEntry>,
    #[serde(default)]
    fallback: Option<InterfaceFallback>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeEntry {
    #[default]
    Blocks,
    AddressScan,
}

#[derive(Debug, Deserialize)]
struct NeighborEntry {
    protocol: NeighborProtocol,
    command: String,
    #[serde(default)]
    mode: ModeEntry,
    #[serde(default)]
    record_start: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    interface: Option<String>,
}

// ---------------------------------------------------------------------------
// Compiled corpus

/// Per-interface neighbor query used when the detail command is rejected
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceFallback {
    /// Summary table whose first column lists local interfaces
    pub summary_command: String,
    /// Detail command with `{interface}` placeholder
    pub interface_command: String,
}

impl InterfaceFallback {
    pub fn command_for(&self, interface: &str) -> String {
        self.interface_command.replace(INTERFACE_PLACEHOLDER, interface)
    }
}

/// Field extractors for block-structured neighbor output
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub record_start: Regex,
    pub address: Regex,
    pub hostname: Option<Regex>,
    pub platform: Option<Regex>,
    pub interface: Option<Regex>,
}

#[derive(Debug, Clone)]
pub enum TemplateMode {
    /// Split output into records at `record_start` and extract fields per record
    Blocks(BlockTemplate),
    /// Treat every IPv4 literal in the output as a neighbor address
    AddressScan,
}

/// How to read one neighbor table on one platform
#[derive(Debug, Clone)]
pub struct NeighborTemplate {
    pub protocol: NeighborProtocol,
    pub command: String,
    pub mode: TemplateMode,
}

/// Everything known about driving one platform family
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub family: PlatformFamily,
    pub probe_command: String,
    /// Turns the CLI pager off for the rest of the session
    pub paging_command: Option<String>,
    signatures: Vec<Regex>,
    hint_patterns: Vec<Regex>,
    pub hostname_command: Option<String>,
    hostname_pattern: Option<Regex>,
    error_patterns: Vec<Regex>,
    pub neighbors: Vec<NeighborTemplate>,
    pub fallback: Option<InterfaceFallback>,
}

impl PlatformProfile {
    /// Whether probe output identifies this platform
    pub fn matches_signature(&self, output: &str) -> bool {
        self.signatures.iter().any(|re| re.is_match(output))
    }

    /// Whether a neighbor-advertised platform hint names this platform
    pub fn matches_hint(&self, hint: &str) -> bool {
        self.hint_patterns.iter().any(|re| re.is_match(hint))
    }

    /// Extract the hostname from the output of `hostname_command`
    pub fn hostname_from(&self, output: &str) -> Option<String> {
        let re = self.hostname_pattern.as_ref()?;
        re.captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|h| !h.is_empty())
    }

    /// Returns the offending line if the device rejected the command
    pub fn rejection(&self, output: &str) -> Option<String> {
        self.error_patterns.iter().find_map(|re| {
            re.find(output).map(|m| {
                let line_start = output[..m.start()].rfind('\n').map_or(0, |i| i + 1);
                let line_end = output[m.end()..]
                    .find('\n')
                    .map_or(output.len(), |i| m.end() + i);
                output[line_start..line_end].trim().to_string()
            })
        })
    }

    /// Template for a given neighbor protocol
    pub fn template(&self, protocol: NeighborProtocol) -> Option<&NeighborTemplate> {
        self.neighbors.iter().find(|t| t.protocol == protocol)
    }
}

/// Immutable lookup of platform family → profile, loaded once at startup
#[derive(Debug, Clone)]
pub struct TemplateCorpus {
    aliases: HashMap<String, PlatformFamily>,
    profiles: Vec<PlatformProfile>,
    index: HashMap<PlatformFamily, usize>,
}

impl TemplateCorpus {
    /// The corpus embedded in the crate
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_toml(BUILTIN_CORPUS)
    }

    /// Load a corpus from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a corpus from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, TemplateError> {
        let file: CorpusFile = toml::from_str(content)?;

        let mut profiles = Vec::with_capacity(file.platform.len());
        let mut index = HashMap::new();
        for entry in file.platform {
            let profile = compile_profile(entry)?;
            if index.contains_key(&profile.family) {
                return Err(TemplateError::DuplicatePlatform(profile.family.0));
            }
            index.insert(profile.family.clone(), profiles.len());
            profiles.push(profile);
        }

        let mut aliases = HashMap::new();
        for (alias, target) in file.aliases {
            let family = PlatformFamily::new(&target);
            if !index.contains_key(&family) {
                return Err(TemplateError::UnknownAlias { alias, target });
            }
            aliases.insert(alias.trim().to_lowercase(), family);
        }

        debug!(
            version = %file.version,
            platforms = profiles.len(),
            aliases = aliases.len(),
            "Loaded template corpus"
        );

        Ok(Self {
            aliases,
            profiles,
            index,
        })
    }

    /// Canonical family for a name, following the alias table
    pub fn canonical(&self, name: &str) -> PlatformFamily {
        let family = PlatformFamily::new(name);
        self.aliases.get(family.as_str()).cloned().unwrap_or(family)
    }

    /// Profile for a family (aliases accepted)
    pub fn profile(&self, family: &PlatformFamily) -> Result<&PlatformProfile, DiscoveryError> {
        let canonical = self.canonical(family.as_str());
        self.index
            .get(&canonical)
            .map(|&i| &self.profiles[i])
            .ok_or_else(|| DiscoveryError::UnsupportedPlatform(family.to_string()))
    }

    pub fn families(&self) -> Vec<PlatformFamily> {
        self.profiles.iter().map(|p| p.family.clone()).collect()
    }

    /// Classify a neighbor-advertised platform hint, if any profile claims it
    ///
    /// A hint that is itself a family name or alias is accepted as-is.
    pub fn classify_hint(&self, hint: &str) -> Option<PlatformFamily> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }
        let named = self.canonical(hint);
        if self.index.contains_key(&named) {
            return Some(named);
        }
        self.profiles
            .iter()
            .find(|p| p.matches_hint(hint))
            .map(|p| p.family.clone())
    }

    /// Distinct probe commands in corpus order
    pub fn probe_commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = Vec::new();
        for profile in &self.profiles {
            if !commands.contains(&profile.probe_command.as_str()) {
                commands.push(&profile.probe_command);
            }
        }
        commands
    }

    /// First family whose probe command is `command` and whose signature matches `output`
    pub fn identify(&self, command: &str, output: &str) -> Option<PlatformFamily> {
        self.profiles
            .iter()
            .filter(|p| p.probe_command == command)
            .find(|p| p.matches_signature(output))
            .map(|p| p.family.clone())
    }

    /// Parse one neighbor table of `family`
    pub fn parse(
        &self,
        family: &PlatformFamily,
        protocol: NeighborProtocol,
        raw: &str,
    ) -> Result<Vec<NeighborRecord>, DiscoveryError> {
        let profile = self.profile(family)?;
        let template = profile.template(protocol).ok_or_else(|| {
            DiscoveryError::UnsupportedPlatform(format!("{} ({})", profile.family, protocol))
        })?;
        parser::parse(&profile.family, template, raw)
    }
}

fn compile(platform: &str, field: &str, pattern: &str) -> Result<Regex, TemplateError> {
    Regex::new(pattern).map_err(|source| TemplateError::InvalidPattern {
        platform: platform.to_string(),
        field: field.to_string(),
        source,
    })
}

fn compile_all(platform: &str, field: &str, patterns: &[String]) -> Result<Vec<Regex>, TemplateError> {
    patterns
        .iter()
        .map(|p| compile(platform, field, p))
        .collect()
}

fn compile_optional(
    platform: &str,
    field: &str,
    pattern: Option<&String>,
) -> Result<Option<Regex>, TemplateError> {
    pattern.map(|p| compile(platform, field, p)).transpose()
}

fn compile_profile(entry: PlatformEntry) -> Result<PlatformProfile, TemplateError> {
    let family = PlatformFamily::new(&entry.name);
    let name = family.as_str();

    let mut neighbors = Vec::with_capacity(entry.neighbor.len());
    for template in &entry.neighbor {
        let mode = match template.mode {
            ModeEntry::AddressScan => TemplateMode::AddressScan,
            ModeEntry::Blocks => {
                let field = |field: &'static str, value: Option<&String>| {
                    value.cloned().ok_or(TemplateError::MissingField {
                        platform: name.to_string(),
                        protocol: template.protocol,
                        field,
                    })
                };
                let record_start = field("record_start", template.record_start.as_ref())?;
                let address = field("address", template.address.as_ref())?;
                TemplateMode::Blocks(BlockTemplate {
                    record_start: compile(name, "record_start", &record_start)?,
                    address: compile(name, "address", &address)?,
                    hostname: compile_optional(name, "hostname", template.hostname.as_ref())?,
                    platform: compile_optional(name, "platform", template.platform.as_ref())?,
                    interface: compile_optional(name, "interface", template.interface.as_ref())?,
                })
            }
        };
        neighbors.push(NeighborTemplate {
            protocol: template.protocol,
            command: template.command.clone(),
            mode,
        });
    }

    if let Some(ref fallback) = entry.fallback {
        if !fallback.interface_command.contains(INTERFACE_PLACEHOLDER) {
            return Err(TemplateError::BadFallback(name.to_string()));
        }
    }

    Ok(PlatformProfile {
        signatures: compile_all(name, "signatures", &entry.signatures)?,
        hint_patterns: compile_all(name, "hint_patterns", &entry.hint_patterns)?,
        hostname_pattern: compile_optional(name, "hostname_pattern", entry.hostname_pattern.as_ref())?,
        error_patterns: compile_all(name, "error_patterns", &entry.error_patterns)?,
        probe_command: entry.probe_command,
        paging_command: entry.paging_command,
        hostname_command: entry.hostname_command,
        neighbors,
        fallback: entry.fallback,
        family,
    })
}
