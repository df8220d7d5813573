//! SSH transport: one interactive PTY shell per device over russh
//!
//! Authentication happens in-process (password, keyboard-interactive or key
//! file). After login the transport learns the device prompt and then runs
//! commands one at a time, answering pager prompts until the prompt returns.
//! Dropping the transport drops the russh handle, which tears the connection
//! down, so an abandoned visit leaves nothing behind.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle, KeyboardInteractiveAuthResponse, Msg};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use netcrawl_core::{Auth, Credentials, DeviceAddress, DiscoveryError};

use crate::channel::{ShellScreen, DEFAULT_PAGER_PATTERNS, DEFAULT_PROMPT_PATTERN};

/// Keyboard-interactive rounds before giving up
const MAX_INTERACTIVE_ROUNDS: usize = 3;

/// SSH settings shared by every session
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Time allowed for TCP connect, authentication and the first prompt
    pub connect_timeout: Duration,
    /// Time allowed for a single command
    pub command_timeout: Duration,
    /// Verify host keys against known_hosts
    pub strict_host_key_checking: bool,
    /// known_hosts file used for verification (`~/.ssh/known_hosts` when unset)
    pub known_hosts_file: Option<PathBuf>,
    /// PTY size requested for the shell
    pub terminal_width: u32,
    pub terminal_height: u32,
    /// Regex matching the device prompt line
    pub prompt_pattern: String,
    /// Regexes matching pager prompts
    pub pager_patterns: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            strict_host_key_checking: false,
            known_hosts_file: None,
            terminal_width: 511,
            terminal_height: 24,
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_string(),
            pager_patterns: DEFAULT_PAGER_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SshOptions {
    /// Compile the prompt and pager patterns
    pub fn screen(&self) -> Result<ShellScreen, DiscoveryError> {
        ShellScreen::new(&self.prompt_pattern, &self.pager_patterns)
            .map_err(|e| DiscoveryError::InvalidConfig(format!("bad shell pattern: {}", e)))
    }

    fn client_config(&self) -> client::Config {
        client::Config {
            inactivity_timeout: Some(self.connect_timeout + self.command_timeout),
            keepalive_interval: Some(Duration::from_secs(10)),
            ..Default::default()
        }
    }
}

/// Host key policy applied during key exchange
struct HostKeyPolicy {
    address: DeviceAddress,
    port: u16,
    strict: bool,
    known_hosts_file: Option<PathBuf>,
}

impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        if !self.strict {
            return Ok(true);
        }
        let host = self.address.to_string();
        let known = match &self.known_hosts_file {
            Some(path) => {
                russh::keys::check_known_hosts_path(&host, self.port, server_public_key, path)
            }
            None => russh::keys::check_known_hosts(&host, self.port, server_public_key),
        };
        match known {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(ip = %self.address, "Host key not in known_hosts, refusing");
                Ok(false)
            }
            Err(e) => {
                warn!(ip = %self.address, error = %e, "Host key verification failed");
                Ok(false)
            }
        }
    }
}

/// An authenticated interactive shell on one device
pub struct SshTransport {
    address: DeviceAddress,
    handle: Handle<HostKeyPolicy>,
    channel: Channel<Msg>,
    screen: ShellScreen,
    prompt: String,
    command_timeout: Duration,
}

impl SshTransport {
    /// Connect, authenticate, open a shell and wait for the first prompt
    pub async fn open(
        options: &SshOptions,
        screen: ShellScreen,
        address: DeviceAddress,
        credentials: &Credentials,
    ) -> Result<Self, DiscoveryError> {
        let connection_error = |reason: String| DiscoveryError::Connection { address, reason };
        let timed_out = || {
            connection_error(format!(
                "timed out after {}s",
                options.connect_timeout.as_secs_f32()
            ))
        };
        let deadline = Instant::now() + options.connect_timeout;

        let policy = HostKeyPolicy {
            address,
            port: credentials.port,
            strict: options.strict_host_key_checking,
            known_hosts_file: options.known_hosts_file.clone(),
        };

        trace!(ip = %address, port = credentials.port, "Opening SSH connection");
        let mut handle = timeout_at(
            deadline,
            client::connect(
                Arc::new(options.client_config()),
                (address.ip(), credentials.port),
                policy,
            ),
        )
        .await
        .map_err(|_| timed_out())?
        .map_err(|e| connection_error(e.to_string()))?;

        let authenticated = timeout_at(deadline, authenticate(&mut handle, credentials))
            .await
            .map_err(|_| timed_out())?
            .map_err(connection_error)?;
        if !authenticated {
            return Err(connection_error(format!(
                "authentication failed for user '{}'",
                credentials.username
            )));
        }

        let channel = timeout_at(deadline, open_shell(&handle, options))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| connection_error(e.to_string()))?;

        let mut transport = Self {
            address,
            handle,
            channel,
            screen,
            prompt: String::new(),
            command_timeout: options.command_timeout,
        };

        // Some devices only print the prompt after a keystroke
        transport.send("\n").await.map_err(connection_error)?;
        let banner = transport
            .read_until(deadline, None)
            .await
            .map_err(connection_error)?;
        transport.prompt = transport
            .screen
            .trailing_prompt(&banner)
            .ok_or_else(|| connection_error("no prompt after login".to_string()))?;

        debug!(
            ip = %address,
            user = %credentials.username,
            prompt = %transport.prompt,
            "SSH session established"
        );
        Ok(transport)
    }

    /// Run one command and return its output without echo or prompt
    pub async fn exec(&mut self, command: &str) -> Result<String, DiscoveryError> {
        let address = self.address;
        let command_error = |reason: String| DiscoveryError::Command {
            address,
            command: command.to_string(),
            reason,
        };

        trace!(ip = %address, command = %command, "Running command");
        self.send(&format!("{}\n", command))
            .await
            .map_err(command_error)?;

        let deadline = Instant::now() + self.command_timeout;
        let prompt = self.prompt.clone();
        let screen = self
            .read_until(deadline, Some(&prompt))
            .await
            .map_err(command_error)?;

        Ok(self.screen.command_output(&screen, command))
    }

    /// End the shell and disconnect
    pub async fn close(self) {
        let _ = self.channel.eof().await;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            trace!(ip = %self.address, error = %e, "Disconnect failed");
        }
        debug!(ip = %self.address, "SSH session closed");
    }

    async fn send(&mut self, text: &str) -> Result<(), String> {
        self.channel
            .data(text.as_bytes())
            .await
            .map_err(|e| e.to_string())
    }

    /// Collect shell output until the screen ends with a prompt
    ///
    /// With `expect` set only that exact prompt ends the read, otherwise any
    /// line matching the prompt pattern does. Pager prompts are answered on
    /// the way.
    async fn read_until(
        &mut self,
        deadline: Instant,
        expect: Option<&str>,
    ) -> Result<String, String> {
        let mut raw = String::new();
        let mut answered = 0;

        loop {
            let msg = timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| "timed out waiting for prompt".to_string())?;

            match msg {
                Some(ChannelMsg::Data { ref data })
                | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    raw.push_str(&String::from_utf8_lossy(data));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err("shell closed by device".to_string());
                }
                Some(_) => continue,
            }

            let screen = self.screen.clean(&raw);
            let done = match expect {
                Some(prompt) => self.screen.ends_with_prompt(&screen, prompt),
                None => self.screen.trailing_prompt(&screen).is_some(),
            };
            if done {
                return Ok(screen);
            }

            if raw.len() > answered && self.screen.at_pager(&screen) {
                trace!(ip = %self.address, "Answering pager prompt");
                answered = raw.len();
                self.send(" ").await?;
            }
        }
    }
}

async fn authenticate(
    handle: &mut Handle<HostKeyPolicy>,
    credentials: &Credentials,
) -> Result<bool, String> {
    let user = credentials.username.as_str();
    match &credentials.auth {
        Auth::Password(password) => {
            let result = handle
                .authenticate_password(user, password.as_str())
                .await
                .map_err(|e| e.to_string())?;
            if result.success() {
                return Ok(true);
            }
            // Many network OSes only offer keyboard-interactive
            trace!(user = %user, "Password auth refused, trying keyboard-interactive");
            keyboard_interactive(handle, user, password).await
        }
        Auth::KeyFile(path) => {
            let key = load_secret_key(path, None)
                .map_err(|e| format!("cannot load key {}: {}", path.display(), e))?;
            let hash = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| e.to_string())?
                .flatten();
            let result = handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
                .await
                .map_err(|e| e.to_string())?;
            Ok(result.success())
        }
    }
}

async fn keyboard_interactive(
    handle: &mut Handle<HostKeyPolicy>,
    user: &str,
    password: &str,
) -> Result<bool, String> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await
        .map_err(|e| e.to_string())?;

    for _ in 0..MAX_INTERACTIVE_ROUNDS {
        let answers = match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { ref prompts, .. } => {
                vec![password.to_string(); prompts.len()]
            }
        };
        response = handle
            .authenticate_keyboard_interactive_respond(answers)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(false)
}

async fn open_shell(
    handle: &Handle<HostKeyPolicy>,
    options: &SshOptions,
) -> Result<Channel<Msg>, russh::Error> {
    let channel = handle.channel_open_session().await?;
    channel
        .request_pty(
            false,
            "vt100",
            options.terminal_width,
            options.terminal_height,
            0,
            0,
            &[],
        )
        .await?;
    channel.request_shell(false).await?;
    Ok(channel)
}
