//! Soundbox daemon: keeps the local sound cache in step with a remote
//! content store and plays cached sounds when tags are scanned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use core_ipc::{Channel, ChannelPaths, ProgressWriter, ReadyWriter};
use core_library::LibraryIndex;
use core_playback::{CoordinatorConfig, Mpg123Launcher, PlaybackCoordinator};
use core_sync::{HttpRemoteStore, SyncConfig, SyncEngine, SyncError};

/// Capacity of the in-process scan mailbox fed by the scan FIFO.
const SCAN_BUFFER: usize = 64;

/// Tap-to-play sound appliance daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Base URL of the remote content store
    #[arg(long)]
    base_url: String,

    /// Local sound cache directory
    #[arg(long, default_value = "/var/lib/soundbox/sounds")]
    cache_root: PathBuf,

    /// Refetch every remote item on the startup pass regardless of change
    /// detection
    #[arg(long)]
    force_update: bool,

    /// Seconds between reconciliation passes
    #[arg(long, default_value = "300")]
    sync_interval: u64,

    /// Upper bound on simultaneous downloads
    #[arg(long, default_value = "5")]
    max_concurrent_downloads: usize,

    /// Trust the existing cache instead of reconciling at startup
    #[arg(long)]
    skip_startup_sync: bool,

    /// ALSA device the decoder is bound to
    #[arg(long, default_value = "hw:0,0")]
    audio_device: String,

    /// FIFO carrying scanned tag ids
    #[arg(long, default_value = "/tmp/rfid_pipe")]
    scan_pipe: PathBuf,

    /// FIFO carrying readiness tokens
    #[arg(long, default_value = "/tmp/audio_ready_pipe")]
    ready_pipe: PathBuf,

    /// FIFO carrying sync progress lines
    #[arg(long, default_value = "/tmp/sync_progress_pipe")]
    progress_pipe: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        base_url = %cli.base_url,
        cache_root = %cli.cache_root.display(),
        "Soundbox daemon starting"
    );

    // Cache root and channel creation are the only fatal startup errors;
    // everything downstream degrades and retries instead.
    tokio::fs::create_dir_all(&cli.cache_root)
        .await
        .context("Failed to create cache root")?;

    let paths = ChannelPaths {
        scan: cli.scan_pipe,
        ready: cli.ready_pipe,
        progress: cli.progress_pipe,
    };
    let progress = ProgressWriter::new(Channel::new(&paths.progress))
        .context("Failed to create progress channel")?;
    let ready =
        ReadyWriter::new(Channel::new(&paths.ready)).context("Failed to create ready channel")?;
    let scan_rx = core_ipc::subscribe(Channel::new(&paths.scan), SCAN_BUFFER)
        .context("Failed to open scan channel")?;

    let library = Arc::new(LibraryIndex::new(&cli.cache_root));
    let indexed = library
        .rebuild()
        .await
        .context("Failed to index existing cache")?;
    info!(indexed, "Indexed existing cache");

    let store = Arc::new(HttpRemoteStore::new(&cli.base_url));
    let sync = Arc::new(SyncEngine::new(
        store,
        Arc::clone(&library),
        Some(progress),
        SyncConfig {
            max_concurrent_downloads: cli.max_concurrent_downloads,
        },
    ));

    if cli.skip_startup_sync {
        info!("Startup sync skipped, trusting existing cache");
    } else {
        match sync.reconcile(cli.force_update).await {
            Ok(outcome) => info!(?outcome, "Startup reconciliation finished"),
            Err(e) => warn!(error = %e, "Startup reconciliation failed"),
        }
    }

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let sync_task = tokio::spawn(sync_loop(
        Arc::clone(&sync),
        Duration::from_secs(cli.sync_interval),
        shutdown.clone(),
    ));

    let launcher = Arc::new(Mpg123Launcher::new(&cli.audio_device));
    let coordinator = PlaybackCoordinator::new(
        Arc::clone(&library),
        Arc::clone(&sync),
        launcher,
        Some(ready),
        CoordinatorConfig::default(),
    );
    coordinator.run(scan_rx, shutdown.clone()).await;

    shutdown.cancel();
    sync_task.await.context("Sync loop panicked")?;

    info!("Shutdown complete");
    Ok(())
}

/// Periodic reconciliation. Ticks that land while a pass is still running
/// are skipped, never queued.
async fn sync_loop(sync: Arc<SyncEngine>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the startup pass already covered it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sync.reconcile(false).await {
                    Ok(outcome) => debug!(?outcome, "Periodic reconciliation finished"),
                    Err(SyncError::PassInFlight) => {
                        debug!("Reconciliation already in flight, skipping tick");
                    }
                    Err(e) => warn!(error = %e, "Periodic reconciliation failed"),
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
            }
            _ = async {
                #[cfg(unix)]
                {
                    use tokio::signal::unix::{signal, SignalKind};
                    match signal(SignalKind::terminate()) {
                        Ok(mut sigterm) => { sigterm.recv().await; }
                        Err(e) => {
                            warn!(error = %e, "Failed to install SIGTERM handler");
                            std::future::pending::<()>().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, shutting down...");
            }
        }
        shutdown.cancel();
    });
}
