//! Backup Waker - Main entry point
//!
//! Runs the backup schedule against a target that may need waking first.

use anyhow::{Context, Result};
use backup_waker::daemon::shutdown::ShutdownCoordinator;
use backup_waker::engine::{BackupEngine, CommandEngine, StatusQuery};
use backup_waker::scheduler::{BackupScheduler, CycleOutcome};
use backup_waker::status::normalize;
use backup_waker::target::{SystemNetwork, TargetAvailability, TargetIdentity};
use backup_waker::{utils, Config};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "/etc/backup-waker/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the normalized engine status as JSON and exit
    #[arg(long, conflicts_with_all = ["once", "stop", "reload"])]
    status: bool,

    /// Stop the running backup and exit
    #[arg(long, conflicts_with_all = ["once", "reload"])]
    stop: bool,

    /// Tell the backup engine to reload its configuration and exit
    #[arg(long, conflicts_with = "once")]
    reload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let engine = Arc::new(CommandEngine::from_config(&config.engine));

    if args.status {
        let raw = engine.query().await?;
        let status = normalize(raw.flags, &raw.last_backup_text);
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if args.stop {
        engine.stop_backup().await?;
        return Ok(());
    }

    if args.reload {
        engine.reload_configuration().await?;
        return Ok(());
    }

    let instance = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "backup-waker".to_string());
    tracing::info!(
        "Starting backup-waker v{} on {} (target: {})",
        env!("CARGO_PKG_VERSION"),
        instance,
        config.target.host
    );

    // Create shutdown coordinator
    let shutdown = ShutdownCoordinator::new();
    let signal_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };

    let availability = TargetAvailability::new(Arc::new(SystemNetwork::new()), config.wake_config());
    let mut scheduler = BackupScheduler::new(
        config.schedule_settings(),
        config.target_identity(),
        engine.clone(),
        engine,
        availability,
        shutdown.token(),
    );

    // Persist a freshly resolved hardware address back to the config file
    let persist_handle = tokio::spawn(persist_identity(
        scheduler.subscribe_identity(),
        config.clone(),
        args.config.clone(),
    ));

    let result = if args.once {
        let outcome = scheduler.run_once().await;
        if let Ok(CycleOutcome::Sleep(sleep_for)) = &outcome {
            tracing::info!(next_check_secs = sleep_for.as_secs(), "Single cycle finished");
        }
        drop(scheduler);
        outcome.map(|_| ())
    } else {
        scheduler.run().await
    };

    // Stop the signal listener and let the persister drain
    shutdown.token().cancel();
    let _ = signal_handle.await;
    if tokio::time::timeout(Duration::from_secs(3), persist_handle).await.is_err() {
        tracing::warn!("Timed out saving target identity");
    }

    match result {
        Ok(()) => {
            tracing::info!("backup-waker stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

async fn persist_identity(
    mut identity_rx: watch::Receiver<TargetIdentity>,
    mut config: Config,
    path: PathBuf,
) {
    while identity_rx.changed().await.is_ok() {
        let mac_address = identity_rx.borrow_and_update().mac_address;
        if mac_address == config.target.mac_address {
            continue;
        }

        config.target.mac_address = mac_address;
        match config.save(&path) {
            Ok(()) => tracing::info!(
                path = %path.display(),
                mac_address = ?mac_address.map(|mac| mac.to_string()),
                "Saved target hardware address"
            ),
            Err(e) => tracing::warn!(path = %path.display(), "Failed to save target hardware address: {}", e),
        }
    }
}
