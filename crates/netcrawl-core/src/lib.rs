//! netcrawl Core - Core types, credentials, and neighbor template parsing
//!
//! This crate provides the foundational types for netcrawl:
//! - Device, neighbor and inventory types for the discovery traversal
//! - The per-device error taxonomy
//! - Credential store with per-address overrides
//! - Platform template corpus and the neighbor-table parser
//! - Neighbor record normalization

pub mod credentials;
pub mod device;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod platform;
pub mod template;

pub use credentials::{Auth, CredentialError, CredentialStore, Credentials};
pub use device::{DeviceAddress, DeviceRecord, FrontierEntry, Inventory, NeighborRecord};
pub use error::DiscoveryError;
pub use normalize::normalize;
pub use platform::{NeighborProtocol, PlatformFamily};
pub use template::{PlatformProfile, TemplateCorpus, TemplateError};
