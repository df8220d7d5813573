//! netcrawl - Main entry point
//!
//! Walks CDP/LLDP neighbor tables outward from a seed device over SSH and
//! prints the discovered inventory.

mod config;
mod report;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use netcrawl_core::{CredentialStore, DeviceAddress, TemplateCorpus};
use netcrawl_discovery::{CancelSignal, DiscoveryEngine, DiscoveryReport};
use netcrawl_session::SshConnector;

#[derive(Parser, Debug)]
#[command(name = "netcrawl")]
#[command(about = "Network topology discovery over CDP/LLDP neighbor tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the network outward from a seed device
    Discover(DiscoverArgs),
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    /// Management address of the first device to log into
    seed: DeviceAddress,

    /// Credential file (YAML, or TOML with a .toml extension)
    credentials: PathBuf,

    /// Number of neighbor hops to follow from the seed
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    max_depth: u32,

    /// Verbose per-device logging
    #[arg(long)]
    debug: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "netcrawl.toml")]
    config: PathBuf,

    /// Neighbor template corpus (built-in when omitted)
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Concurrent device sessions
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-device timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Stop starting new visits after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// CSV output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the full report as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Discover(args) => discover(args).await,
    }
}

async fn discover(args: DiscoverArgs) -> Result<()> {
    // Logs go to stderr so stdout carries only the inventory
    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(args.debug)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("netcrawl v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(workers) = args.workers {
        config.discovery.workers = workers;
    }
    if let Some(timeout) = args.timeout {
        config.discovery.visit_timeout_secs = timeout;
    }
    if let Some(deadline) = args.deadline {
        config.discovery.deadline_secs = Some(deadline);
    }
    if let Some(templates) = args.templates {
        config.discovery.templates = Some(templates);
    }
    if let Some(output) = args.output {
        config.output.csv_path = output;
    }
    if args.json {
        config.output.json = true;
    }

    let credentials = CredentialStore::from_file(&args.credentials)
        .with_context(|| format!("Failed to load credentials from {}", args.credentials.display()))?;
    if !credentials.has_default() {
        warn!("No default credentials, only devices with an override will be visited");
    }

    let corpus = match config.discovery.templates {
        Some(ref path) => TemplateCorpus::from_file(path)
            .with_context(|| format!("Failed to load templates from {}", path.display()))?,
        None => TemplateCorpus::builtin()?,
    };
    info!(
        platforms = corpus.families().len(),
        workers = config.discovery.workers,
        "Configuration loaded"
    );

    let connector = SshConnector::new(config.to_ssh_options())?;
    let engine = DiscoveryEngine::new(
        connector,
        credentials,
        corpus,
        config.to_discovery_config(args.max_depth),
    );

    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with the devices found so far");
            trigger.cancel();
        }
    });

    let report = engine.discover_with_cancel(args.seed, &cancel).await?;

    let rendered = report::render(&report.inventory)?;
    if config.output.json {
        println!("{}", report::render_json(&report)?);
    } else {
        println!("{}", rendered.table);
    }
    if let Err(e) = report::write_csv(&config.output.csv_path, &rendered) {
        error!("Could not write CSV inventory: {:#}", e);
    }

    summarize(&report);
    Ok(())
}

fn summarize(report: &DiscoveryReport) {
    let elapsed = report.finished_at - report.started_at;
    info!(
        attempted = report.attempted,
        succeeded = report.succeeded(),
        expansion_failures = report.expansion_failures,
        elapsed_ms = elapsed.num_milliseconds(),
        "Discovered {} of {} devices attempted",
        report.succeeded(),
        report.attempted
    );
    for (kind, count) in report.failures_by_kind() {
        warn!(kind = kind, count = count, "Devices skipped");
    }
    if report.cancelled {
        warn!("Discovery was cut short, inventory is partial");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<DiscoverArgs, clap::Error> {
        let cli = Cli::try_parse_from(std::iter::once("netcrawl").chain(args.iter().copied()))?;
        match cli.command {
            Command::Discover(args) => Ok(args),
        }
    }

    #[test]
    fn test_discover_arguments() {
        let args = parse(&["discover", "192.168.122.201", "creds.yaml", "3", "--debug"]).unwrap();
        assert_eq!(args.seed, "192.168.122.201".parse::<DeviceAddress>().unwrap());
        assert_eq!(args.credentials, PathBuf::from("creds.yaml"));
        assert_eq!(args.max_depth, 3);
        assert!(args.debug);
        assert!(!args.json);
        assert_eq!(args.config, PathBuf::from("netcrawl.toml"));
        assert_eq!(args.workers, None);
    }

    #[test]
    fn test_overrides_parse() {
        let args = parse(&[
            "discover", "10.0.0.1", "creds.toml", "1", "--workers", "4", "--timeout", "20",
            "--deadline", "300", "-o", "out.csv", "--json",
        ])
        .unwrap();
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.timeout, Some(20));
        assert_eq!(args.deadline, Some(300));
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
        assert!(args.json);
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(parse(&["discover", "192.168.122.201", "creds.yaml", "0"]).is_err());
    }

    #[test]
    fn test_missing_depth_rejected() {
        assert!(parse(&["discover", "192.168.122.201", "creds.yaml"]).is_err());
    }

    #[test]
    fn test_hostname_seed_rejected() {
        let err = parse(&["discover", "veos-b1", "creds.yaml", "3"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_negative_depth_rejected() {
        assert!(parse(&["discover", "192.168.122.201", "creds.yaml", "-1"]).is_err());
    }
}
