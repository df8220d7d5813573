//! Configuration loading (`netcrawl.toml`)

use anyhow::{Context, Result};
use netcrawl_discovery::{DiscoveryConfig, DEFAULT_VISIT_TIMEOUT_SECS, DEFAULT_WORKERS};
use netcrawl_session::SshOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub ssh: SshSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// Concurrent device sessions
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Time allowed for one device visit, in seconds
    #[serde(default = "default_visit_timeout")]
    pub visit_timeout_secs: u64,
    /// Stop dispatching new visits after this many seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    /// Neighbor template corpus replacing the built-in one
    #[serde(default)]
    pub templates: Option<PathBuf>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            visit_timeout_secs: default_visit_timeout(),
            deadline_secs: None,
            templates: None,
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_visit_timeout() -> u64 {
    DEFAULT_VISIT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSection {
    /// TCP connect, authentication and first prompt, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Single command timeout, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub strict_host_key_checking: bool,
    #[serde(default)]
    pub known_hosts_file: Option<PathBuf>,
    /// Prompt regex replacing the built-in one
    #[serde(default)]
    pub prompt_pattern: Option<String>,
    /// Extra pager prompt regexes, on top of the built-in ones
    #[serde(default)]
    pub pager_patterns: Vec<String>,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            strict_host_key_checking: false,
            known_hosts_file: None,
            prompt_pattern: None,
            pager_patterns: Vec::new(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// CSV inventory path
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
    /// Print JSON instead of the table
    #[serde(default)]
    pub json: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            json: false,
        }
    }
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("discovered_devices.csv")
}

impl Config {
    /// Engine settings for a run limited to `max_depth`
    pub fn to_discovery_config(&self, max_depth: u32) -> DiscoveryConfig {
        DiscoveryConfig {
            max_depth,
            workers: self.discovery.workers,
            visit_timeout: Duration::from_secs(self.discovery.visit_timeout_secs),
            deadline: self.discovery.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn to_ssh_options(&self) -> SshOptions {
        let defaults = SshOptions::default();
        let mut pager_patterns = defaults.pager_patterns;
        pager_patterns.extend(self.ssh.pager_patterns.iter().cloned());
        SshOptions {
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
            strict_host_key_checking: self.ssh.strict_host_key_checking,
            known_hosts_file: self.ssh.known_hosts_file.clone(),
            prompt_pattern: self
                .ssh
                .prompt_pattern
                .clone()
                .unwrap_or(defaults.prompt_pattern),
            pager_patterns,
            ..defaults
        }
    }
}

/// Load configuration from file, or defaults if it does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
