//! Credential store - default credentials plus per-address overrides
//!
//! The store is loaded once at startup from a YAML (or TOML) file:
//!
//! ```yaml
//! default:
//!   username: admin
//!   password: admin
//! devices:
//!   192.168.122.203:
//!     username: ops
//!     auth_method: ssh_key
//!     ssh_key_file: ~/.ssh/id_ed25519
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::device::DeviceAddress;
use crate::error::DiscoveryError;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to read credential file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse credential YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Failed to parse credential TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Invalid device address '{0}' in credential overrides")]
    InvalidAddress(String),
    #[error("Credentials for {0} have no username")]
    MissingUsername(String),
    #[error("Credentials for {0} use ssh_key auth but no ssh_key_file is set")]
    MissingKeyFile(String),
}

/// How to authenticate against a device
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Password(String),
    KeyFile(PathBuf),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => write!(f, "Password(***)"),
            Self::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

/// Resolved authentication material for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub auth: Auth,
    pub port: u16,
}

impl Credentials {
    pub fn password(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            auth: Auth::Password(password.to_string()),
            port: DEFAULT_SSH_PORT,
        }
    }

    pub fn key_file(username: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            username: username.to_string(),
            auth: Auth::KeyFile(path.into()),
            port: DEFAULT_SSH_PORT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AuthMethod {
    #[default]
    Password,
    SshKey,
}

#[derive(Debug, Default, Deserialize)]
struct OptionalArgs {
    #[serde(default)]
    port: Option<u16>,
}

/// One credential entry as written in the file
#[derive(Debug, Deserialize)]
struct CredentialEntry {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    auth_method: AuthMethod,
    #[serde(default)]
    ssh_key_file: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    /// Port location used by older credential files
    #[serde(default)]
    optional_args: OptionalArgs,
}

impl CredentialEntry {
    fn into_credentials(self, label: &str) -> Result<Credentials, CredentialError> {
        if self.username.trim().is_empty() {
            return Err(CredentialError::MissingUsername(label.to_string()));
        }

        let auth = match self.auth_method {
            AuthMethod::Password => Auth::Password(self.password.unwrap_or_default()),
            AuthMethod::SshKey => {
                let path = self
                    .ssh_key_file
                    .ok_or_else(|| CredentialError::MissingKeyFile(label.to_string()))?;
                Auth::KeyFile(expand_home(&path))
            }
        };

        Ok(Credentials {
            username: self.username,
            auth,
            port: self
                .port
                .or(self.optional_args.port)
                .unwrap_or(DEFAULT_SSH_PORT),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    default: Option<CredentialEntry>,
    #[serde(default)]
    devices: HashMap<String, CredentialEntry>,
}

/// Immutable credential lookup built once at startup
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    default: Option<Credentials>,
    overrides: HashMap<DeviceAddress, Credentials>,
}

impl CredentialStore {
    /// Create a store with an optional default and no overrides
    pub fn new(default: Option<Credentials>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Add a device-specific override
    pub fn with_override(mut self, address: DeviceAddress, credentials: Credentials) -> Self {
        self.overrides.insert(address, credentials);
        self
    }

    /// Load a credential file, TOML if the extension says so, YAML otherwise
    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        let content = std::fs::read_to_string(path)?;
        let store = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            _ => Self::from_yaml(&content)?,
        };
        debug!(
            path = %path.display(),
            overrides = store.overrides.len(),
            has_default = store.default.is_some(),
            "Loaded credentials"
        );
        Ok(store)
    }

    pub fn from_yaml(content: &str) -> Result<Self, CredentialError> {
        let file: CredentialFile = serde_yaml::from_str(content)?;
        Self::from_parsed(file)
    }

    pub fn from_toml(content: &str) -> Result<Self, CredentialError> {
        let file: CredentialFile = toml::from_str(content)?;
        Self::from_parsed(file)
    }

    fn from_parsed(file: CredentialFile) -> Result<Self, CredentialError> {
        let default = file
            .default
            .map(|entry| entry.into_credentials("default"))
            .transpose()?;

        let mut overrides = HashMap::with_capacity(file.devices.len());
        for (key, entry) in file.devices {
            let address: DeviceAddress = key
                .parse()
                .map_err(|_| CredentialError::InvalidAddress(key.clone()))?;
            overrides.insert(address, entry.into_credentials(&key)?);
        }

        Ok(Self { default, overrides })
    }

    /// Credentials for `address`: its override if present, else the default
    pub fn resolve(&self, address: &DeviceAddress) -> Result<&Credentials, DiscoveryError> {
        self.overrides
            .get(address)
            .or(self.default.as_ref())
            .ok_or(DiscoveryError::NoCredentials(*address))
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(path)
}
