//! Headless capture host.
//!
//! Runs the capture loop against file-backed host adapters: the UI tree is
//! read from a JSON snapshot on every tick, clicks are appended to a JSONL
//! journal, and a lease file stands in for process keep-alive. Runs until
//! Ctrl-C or until `max_ticks` is reached.

use capture_pilot::keepalive::{LeaseConfig, LeaseKeepAlive};
use capture_pilot::provider::{JournalActionChannel, SnapshotFileProvider};
use capture_pilot::{CaptureConfig, LifecycleGuard};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Periodic UI-automation capture loop.
#[derive(Parser)]
#[command(name = "capture-pilot-host", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the capture loop.
    Run,
    /// Write the effective configuration to the config path.
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(CaptureConfig::default_config_path);
    let config = if config_path.exists() {
        CaptureConfig::from_file(&config_path)?
    } else {
        CaptureConfig::default()
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::InitConfig => {
            config.save_to_file(&config_path)?;
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

async fn run(config: CaptureConfig) -> anyhow::Result<()> {
    let provider = Arc::new(SnapshotFileProvider::new(&config.host.snapshot_path));
    let channel = Arc::new(JournalActionChannel::new(&config.host.journal_path));
    let keepalive = Arc::new(LeaseKeepAlive::new(
        config.host.lease_path.clone(),
        LeaseConfig {
            ttl_secs: config.host.lease_ttl_secs,
            heartbeat_secs: config.host.lease_heartbeat_secs,
        },
    ));

    info!(
        snapshot = %provider.path().display(),
        journal = %channel.path().display(),
        lease = %keepalive.path().display(),
        "capture-pilot-host starting"
    );

    let guard = LifecycleGuard::new(provider, channel, keepalive);
    let handle = guard
        .start(&config)
        .map_err(|e| anyhow::anyhow!("cannot start capture loop: {e}"))?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "cannot listen for Ctrl-C, stopping");
            }
            info!("interrupt received, stopping");
        }
        _ = handle.finished() => {}
    }

    guard.stop(&handle).await;

    let snapshot = handle.snapshot();
    info!(
        ticks = snapshot.tick_count,
        matched = snapshot.counters.matched,
        no_tree = snapshot.counters.no_tree,
        no_match = snapshot.counters.no_match,
        failed = snapshot.counters.failed,
        "capture-pilot-host shut down cleanly"
    );
    Ok(())
}
