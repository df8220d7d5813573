//! netcrawl Session - device command sessions
//!
//! The discovery engine talks to devices only through the [`Connector`] and
//! [`Session`] traits. [`SshConnector`] implements them with an interactive
//! PTY shell over russh: it learns the prompt at login, answers pager prompts
//! and strips command echo from the output.

pub mod channel;
pub mod driver;
pub mod transport;

pub use channel::ShellScreen;
pub use driver::{Connector, Session, SshConnector, SshSession};
pub use transport::{SshOptions, SshTransport};
