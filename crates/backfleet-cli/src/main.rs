//! # Backfleet CLI Entry Point
//!
//! Main binary for backfleet. Starts a fleet of synthetic backends, runs a
//! single backend as a child of the fleet, or queries a running fleet's
//! metadata service.
//!
//! ## Usage
//!
//! ```bash
//! # Start 10 backends per traffic type, metadata on port 9090
//! backfleet serve-backends -n 10
//!
//! # Print every backend once the fleet is up
//! backfleet backends http://127.0.0.1:9090
//!
//! # Only the edge backends, as JSON
//! backfleet backends http://127.0.0.1:9090 --traffic-type edge --json
//! ```
//!
//! `serve-backend` is what the orchestrator runs in each child; it reads its
//! identity from the environment and is not meant to be run by hand.

use anyhow::Result;
use argh::FromArgs;
use backfleet_client::MetadataClient;
use backfleet_common::{detect_host_addr, FleetConfig, TrafficType, WorkerCommand, HOST_ADDR_VAR};
use backfleet_orchestrator::Orchestrator;
use backfleet_worker::Worker;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Validates that a URL string starts with http://
///
/// # Arguments
///
/// * `url` - The URL string to validate
/// * `description` - Human-readable description of what the URL is for
///
/// # Errors
///
/// Returns an error if the URL doesn't start with http://
fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http://",
            description,
            url
        ))
    }
}

/// Picks the host address to advertise: the flag, then `BACKFLEET_HOST_ADDR`,
/// then the detected outbound address. Blank values are skipped.
fn resolve_host_addr(flag: Option<String>, from_env: Option<String>) -> String {
    let non_blank = |addr: &String| !addr.trim().is_empty();
    flag.filter(non_blank)
        .or_else(|| from_env.filter(non_blank))
        .unwrap_or_else(|| detect_host_addr().to_string())
}

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Backfleet - synthetic backend fleet for proxy load testing
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **ServeBackends**: Spawn the fleet and serve its registry
/// - **ServeBackend**: Run one backend (launched by `serve-backends`)
/// - **Backends**: Query a running fleet (unix-friendly output)
/// - **Version**: Print the version
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    ServeBackends(ServeBackendsArgs),
    ServeBackend(ServeBackendArgs),
    Backends(BackendsArgs),
    Version(VersionArgs),
}

/// Arguments for starting a fleet.
///
/// One worker process is started per backend, `backends` of each traffic
/// type. The command blocks until every worker has registered, prints where
/// the registry can be read, and then runs until interrupted. Any worker
/// exiting is fatal.
///
/// # Example
///
/// ```bash
/// backfleet serve-backends -n 10 -p 9090 --host-prefix perf
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve-backends")]
/// start a fleet of backends and its metadata service
struct ServeBackendsArgs {
    /// number of backends per traffic type
    #[argh(option, short = 'n', long = "backends", default = "1")]
    backends: usize,

    /// prefix for backend names
    ///
    /// Backends are named `{prefix}-{traffic type}-{index}`.
    #[argh(option, long = "host-prefix", default = "\"backfleet\".into()")]
    host_prefix: String,

    /// port the metadata service listens on, on all interfaces
    #[argh(option, short = 'p', long = "port", default = "9090")]
    port: u16,

    /// address advertised for every backend
    ///
    /// If not set, tries the BACKFLEET_HOST_ADDR env var, then detects the
    /// address of the outbound interface.
    #[argh(option, long = "host-addr")]
    host_addr: Option<String>,

    /// give up if not every backend has registered within this many seconds
    ///
    /// Waits forever when not set.
    #[argh(option, long = "registration-timeout-secs")]
    registration_timeout_secs: Option<u64>,
}

/// Runs a single backend. The orchestrator passes its identity through the
/// environment and holds its stdin open; EOF on stdin stops it.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve-backend")]
/// run one backend (started by serve-backends)
struct ServeBackendArgs {}

/// Arguments for querying a running fleet.
///
/// Prints the registry to stdout. No logging is initialized for this command
/// so the output can be piped.
///
/// # Examples
///
/// ```bash
/// backfleet backends http://127.0.0.1:9090 | awk '{print $3}'
/// backfleet backends http://127.0.0.1:9090 --json | jq '.http'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "backends")]
/// print the backends of a running fleet
struct BackendsArgs {
    /// address of the metadata service
    ///
    /// Must include the http:// prefix (e.g., http://127.0.0.1:9090).
    #[argh(positional)]
    metadata_url: String,

    /// only list backends of this traffic type
    #[argh(option, short = 't', long = "traffic-type")]
    traffic_type: Option<TrafficType>,

    /// print JSON grouped by traffic type instead of text lines
    #[argh(switch, long = "json")]
    json: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "version")]
/// print the version
struct VersionArgs {}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep stdout clean for commands whose output is meant to be consumed.
    if !matches!(cli.command, Commands::Backends(_) | Commands::Version(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::ServeBackends(args) => run_serve_backends(args).await,
        Commands::ServeBackend(_) => {
            Worker::from_env()?.run().await?;
            Ok(())
        }
        Commands::Backends(args) => run_backends(args).await,
        Commands::Version(_) => {
            println!("backfleet {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Executes the `serve-backends` subcommand.
///
/// Runs until Ctrl-C. Returns an error, and so exits non-zero, if startup
/// fails or any worker exits.
async fn run_serve_backends(args: ServeBackendsArgs) -> Result<()> {
    let host_addr = resolve_host_addr(args.host_addr, std::env::var(HOST_ADDR_VAR).ok());
    let config = FleetConfig::new(host_addr, WorkerCommand::current_exe()?)
        .with_backends_per_type(args.backends)
        .with_host_prefix(args.host_prefix)
        .with_metadata_port(args.port)
        .with_registration_timeout(args.registration_timeout_secs.map(Duration::from_secs));

    tracing::info!("Advertising backends on {}", config.host_addr);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
        }
        signal.cancel();
    });

    Orchestrator::new(config).run(cancel).await?;
    Ok(())
}

/// Executes the `backends` subcommand.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the service is unreachable, or
/// the fleet is not ready yet.
async fn run_backends(args: BackendsArgs) -> Result<()> {
    validate_http_url(&args.metadata_url, "metadata URL")?;
    let client = MetadataClient::new(args.metadata_url)?;

    if args.json {
        match args.traffic_type {
            // A single type prints just that type's array, read from the
            // per-type listing so it works as soon as that type is complete.
            Some(t) => {
                let backends = client.backends(Some(t)).await?;
                println!("{}", serde_json::to_string_pretty(&backends)?);
            }
            None => println!("{}", client.backends_json().await?.trim_end()),
        }
    } else {
        print!("{}", client.backends_text(args.traffic_type).await?);
    }

    Ok(())
}
