//! Mastersync node binary.
//!
//! Elects one primary among a fixed set of candidate hosts and keeps
//! following it as hosts come and go.
//!
//! # Usage
//!
//! ```bash
//! # Everything on the command line
//! mastersync --local-address host2 --root host1 --root host2 --root host3
//!
//! # From a config file, overriding the port
//! mastersync --config /etc/mastersync.json --sync-port 7000
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mastersync_runtime::TcpProber;
use mastersync_server::{scheduler, NetworkDriver, NodeConfig, SyncCoordinator};

/// Capacity of the stand-down event queue.
const CONTROL_QUEUE_SIZE: usize = 16;

/// Mastersync primary election node.
#[derive(Parser, Debug)]
#[command(name = "mastersync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Candidate host. Can be specified multiple times; replaces the
    /// config file's roots when given.
    #[arg(long = "root")]
    roots: Vec<String>,

    /// This node's externally resolved address.
    #[arg(long)]
    local_address: Option<String>,

    /// Coordination port.
    #[arg(long)]
    sync_port: Option<u16>,

    /// Probe connect timeout in milliseconds.
    #[arg(long)]
    probe_timeout_ms: Option<u64>,

    /// Interval between evaluations in milliseconds.
    #[arg(long)]
    sync_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Args {
    /// Overlays command-line values on `config`.
    fn apply(self, config: &mut NodeConfig) {
        if !self.roots.is_empty() {
            config.roots = self.roots;
        }
        if let Some(local) = self.local_address {
            config.local_address = Some(local);
        }
        if let Some(port) = self.sync_port {
            config.sync_port = port;
        }
        if let Some(timeout) = self.probe_timeout_ms {
            config.probe_timeout_ms = timeout;
        }
        if let Some(interval) = self.sync_interval_ms {
            config.sync_interval_ms = interval;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    args.apply(&mut config);

    let settings = config.settings()?;
    let candidates = config.candidates()?;

    info!(
        local = %settings.local,
        sync_port = settings.sync_port,
        roots = ?config.roots,
        interval_ms = config.sync_interval_ms,
        "Starting mastersync node"
    );

    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
    let prober = TcpProber::new(settings.sync_port, config.probe_timeout());
    let local = settings.local.clone();
    let driver = NetworkDriver::new(settings, control_tx);
    let transports = driver.transports();

    let coordinator = SyncCoordinator::start(candidates, local, prober, driver).await;
    let scheduler = scheduler::spawn(coordinator, config.sync_interval(), control_rx);

    shutdown_signal().await;
    info!("Shutting down");

    scheduler.stop();
    let _ = scheduler.join().await;
    transports.shutdown_all().await;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
