//! Breadth-first discovery engine
//!
//! The engine walks the neighbor graph one depth level at a time. All visits
//! of a level run concurrently on at most `workers` sessions, and their
//! outcomes are merged back in frontier order before the next level starts,
//! so the inventory order does not depend on which device answers first.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use netcrawl_core::{
    CredentialStore, DeviceAddress, DiscoveryError, FrontierEntry, Inventory, TemplateCorpus,
};
use netcrawl_session::Connector;

use crate::frontier::{Frontier, VisitedSet};
use crate::probe::{visit_device, Visit};

/// Default number of concurrent device sessions
pub const DEFAULT_WORKERS: usize = 10;

/// Default time allowed for one device visit
pub const DEFAULT_VISIT_TIMEOUT_SECS: u64 = 60;

/// Traversal settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Deepest level whose devices are recorded; neighbors of that level are not queried
    pub max_depth: u32,
    /// Maximum concurrent visits
    pub workers: usize,
    /// Time allowed for one visit, connect to close
    pub visit_timeout: Duration,
    /// Stop dispatching new visits after this long
    pub deadline: Option<Duration>,
}

impl DiscoveryConfig {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.max_depth == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.visit_timeout.is_zero() {
            return Err(DiscoveryError::InvalidConfig(
                "visit timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            workers: DEFAULT_WORKERS,
            visit_timeout: Duration::from_secs(DEFAULT_VISIT_TIMEOUT_SECS),
            deadline: None,
        }
    }
}

/// Cooperative cancellation shared between the caller and the engine
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// A device that was attempted but not recorded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitFailure {
    pub address: DeviceAddress,
    pub depth: u32,
    #[serde(serialize_with = "serialize_error")]
    pub error: DiscoveryError,
}

fn serialize_error<S: serde::Serializer>(
    error: &DiscoveryError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Outcome of a whole traversal
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub inventory: Inventory,
    /// Devices a visit was started for
    pub attempted: usize,
    pub failures: Vec<VisitFailure>,
    /// Recorded devices whose neighbor table could not be read
    pub expansion_failures: usize,
    /// Set when cancellation or the deadline stopped the traversal early
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DiscoveryReport {
    pub fn succeeded(&self) -> usize {
        self.inventory.len()
    }

    /// Failure counts keyed by error kind
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.error.kind()).or_insert(0) += 1;
        }
        counts
    }
}

enum VisitOutcome {
    Visited(Visit),
    Failed(DiscoveryError),
    Interrupted,
}

/// Breadth-first topology discovery over a [`Connector`]
pub struct DiscoveryEngine<C: Connector> {
    connector: C,
    credentials: CredentialStore,
    corpus: TemplateCorpus,
    config: DiscoveryConfig,
}

impl<C: Connector> DiscoveryEngine<C> {
    pub fn new(
        connector: C,
        credentials: CredentialStore,
        corpus: TemplateCorpus,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            connector,
            credentials,
            corpus,
            config,
        }
    }

    /// Discover the network reachable from `seed`
    pub async fn discover(&self, seed: DeviceAddress) -> Result<DiscoveryReport, DiscoveryError> {
        self.discover_with_cancel(seed, &CancelSignal::new()).await
    }

    /// Discover the network reachable from `seed`, stopping early on `cancel`
    ///
    /// Only configuration errors are returned; every per-device failure is
    /// recorded in the report.
    pub async fn discover_with_cancel(
        &self,
        seed: DeviceAddress,
        cancel: &CancelSignal,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        self.config.validate()?;

        let started_at = Utc::now();
        let deadline = self.config.deadline.map(|d| Instant::now() + d);

        let mut visited = VisitedSet::new();
        let mut frontier = Frontier::new(FrontierEntry::seed(seed));
        let mut inventory = Inventory::new();
        let mut failures = Vec::new();
        let mut attempted = 0;
        let mut expansion_failures = 0;
        let mut cancelled = false;

        info!(
            seed = %seed,
            max_depth = self.config.max_depth,
            workers = self.config.workers,
            "Starting discovery"
        );

        while let Some(level) = frontier.next_level() {
            if stop_requested(cancel, deadline) {
                cancelled = true;
                break;
            }

            let batch: Vec<FrontierEntry> = level
                .into_iter()
                .filter(|entry| {
                    let fresh = visited.mark(entry.address);
                    if !fresh {
                        debug!(ip = %entry.address, "Already visited, discarding");
                    }
                    fresh
                })
                .collect();

            if let Some(first) = batch.first() {
                debug!(depth = first.depth, devices = batch.len(), "Visiting level");
            }

            let outcomes: Vec<(FrontierEntry, VisitOutcome)> = stream::iter(batch)
                .map(|entry| async move {
                    let outcome = self.dispatch(&entry, cancel, deadline).await;
                    (entry, outcome)
                })
                .buffered(self.config.workers)
                .collect()
                .await;

            for (entry, outcome) in outcomes {
                match outcome {
                    VisitOutcome::Visited(visit) => {
                        attempted += 1;
                        if let Some(ref e) = visit.expansion_error {
                            warn!(ip = %entry.address, error = %e, "Could not read neighbor table");
                            expansion_failures += 1;
                        }

                        info!(
                            ip = %visit.record.address,
                            platform = %visit.record.platform,
                            hostname = %visit.record.hostname,
                            depth = entry.depth,
                            "Discovered device"
                        );
                        inventory.push(visit.record);

                        for neighbor in &visit.neighbors {
                            if visited.contains(&neighbor.peer_address) {
                                continue;
                            }
                            if frontier.push(FrontierEntry::from_neighbor(&entry, neighbor)) {
                                debug!(
                                    ip = %neighbor.peer_address,
                                    via = %entry.address,
                                    depth = entry.depth + 1,
                                    "Queued neighbor"
                                );
                            }
                        }
                    }
                    VisitOutcome::Failed(error) => {
                        attempted += 1;
                        warn!(
                            ip = %entry.address,
                            depth = entry.depth,
                            kind = error.kind(),
                            error = %error,
                            "Visit failed"
                        );
                        failures.push(VisitFailure {
                            address: entry.address,
                            depth: entry.depth,
                            error,
                        });
                    }
                    VisitOutcome::Interrupted => {
                        debug!(ip = %entry.address, "Visit interrupted");
                        cancelled = true;
                    }
                }
            }

            if cancelled {
                break;
            }
        }

        if cancelled {
            warn!(pending = frontier.pending(), "Discovery stopped early");
        }

        let report = DiscoveryReport {
            inventory,
            attempted,
            failures,
            expansion_failures,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            "Discovery complete"
        );

        Ok(report)
    }

    /// Run one visit under the per-visit timeout, abandoning it on cancellation
    async fn dispatch(
        &self,
        entry: &FrontierEntry,
        cancel: &CancelSignal,
        deadline: Option<Instant>,
    ) -> VisitOutcome {
        if stop_requested(cancel, deadline) {
            return VisitOutcome::Interrupted;
        }

        let expand = entry.depth < self.config.max_depth;
        let visit = visit_device(
            &self.connector,
            &self.credentials,
            &self.corpus,
            entry,
            expand,
        );

        tokio::select! {
            biased;
            _ = interrupted(cancel, deadline) => VisitOutcome::Interrupted,
            result = timeout(self.config.visit_timeout, visit) => match result {
                Ok(Ok(visit)) => VisitOutcome::Visited(visit),
                Ok(Err(e)) => VisitOutcome::Failed(e),
                Err(_) => VisitOutcome::Failed(DiscoveryError::Timeout {
                    address: entry.address,
                    elapsed: self.config.visit_timeout,
                }),
            },
        }
    }
}

fn stop_requested(cancel: &CancelSignal, deadline: Option<Instant>) -> bool {
    cancel.is_cancelled() || deadline.is_some_and(|at| Instant::now() >= at)
}

async fn interrupted(cancel: &CancelSignal, deadline: Option<Instant>) {
    match deadline {
        Some(at) => {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep_until(at) => {}
            }
        }
        None => cancel.cancelled().await,
    }
}
