//! Session traits consumed by the discovery engine, and their SSH implementation

use async_trait::async_trait;
use tracing::debug;

use netcrawl_core::{Credentials, DeviceAddress, DiscoveryError, PlatformFamily};

use crate::channel::ShellScreen;
use crate::transport::{SshOptions, SshTransport};

/// Opens sessions to devices
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Open an authenticated session
    ///
    /// `platform` is the family already known from a neighbor hint, if any.
    async fn connect(
        &self,
        address: DeviceAddress,
        credentials: &Credentials,
        platform: Option<&PlatformFamily>,
    ) -> Result<Self::Session, DiscoveryError>;
}

/// An open, authenticated command session on one device
#[async_trait]
pub trait Session: Send {
    /// Run one CLI command and return its raw text output
    async fn run(&mut self, command: &str) -> Result<String, DiscoveryError>;

    /// Release the connection
    async fn close(self);
}

/// Connector opening one russh PTY shell per device
#[derive(Debug, Clone)]
pub struct SshConnector {
    options: SshOptions,
    screen: ShellScreen,
}

impl SshConnector {
    /// Fails when the configured prompt or pager patterns do not compile
    pub fn new(options: SshOptions) -> Result<Self, DiscoveryError> {
        let screen = options.screen()?;
        Ok(Self { options, screen })
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(
        &self,
        address: DeviceAddress,
        credentials: &Credentials,
        platform: Option<&PlatformFamily>,
    ) -> Result<SshSession, DiscoveryError> {
        debug!(
            ip = %address,
            platform = platform.map(|p| p.as_str()).unwrap_or("unknown"),
            "Connecting"
        );
        let transport =
            SshTransport::open(&self.options, self.screen.clone(), address, credentials).await?;
        Ok(SshSession { transport })
    }
}

/// SSH session to one device
pub struct SshSession {
    transport: SshTransport,
}

#[async_trait]
impl Session for SshSession {
    async fn run(&mut self, command: &str) -> Result<String, DiscoveryError> {
        self.transport.exec(command).await
    }

    async fn close(self) {
        self.transport.close().await
    }
}
