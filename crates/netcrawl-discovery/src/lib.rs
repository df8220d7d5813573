//! netcrawl Discovery - breadth-first network topology discovery
//!
//! Starting from a seed device, the engine logs into each device, identifies
//! its platform, records it, and queues the peers from its CDP/LLDP neighbor
//! tables until the depth limit is reached.

pub mod engine;
pub mod frontier;
pub mod probe;

#[cfg(test)]
mod testing;

pub use engine::{
    CancelSignal, DiscoveryConfig, DiscoveryEngine, DiscoveryReport, VisitFailure,
    DEFAULT_VISIT_TIMEOUT_SECS, DEFAULT_WORKERS,
};
pub use frontier::{Frontier, VisitedSet};
pub use probe::{visit_device, Visit};
