//! Process entry point (§4.8 Lifecycle): parse arguments, load config, open
//! the durable stores, wire every component, run the scheduler and the
//! management API side by side, and shut both down cooperatively on
//! SIGINT/SIGTERM. Grounded on the teacher's headless-server `main.rs`
//! (config load → bootstrap services → spawn HTTP task → wait on signal →
//! graceful shutdown), generalized from its Sonos-streaming bootstrap to
//! this crate's storage/artifact/scheduler wiring.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use podsync_engine::api::{self, AppState};
use podsync_engine::artifact::{ArtifactStore, LocalArtifactStore, RemoteArtifactStore};
use podsync_engine::config::{Config, StorageSection};
use podsync_engine::download::{DownloadDriver, UpdateChannel};
use podsync_engine::history_recorder::HistoryRecorder;
use podsync_engine::listing::{Fixtures, ListingRegistry};
use podsync_engine::models::Trigger;
use podsync_engine::progress_tracker::ProgressTracker;
use podsync_engine::scheduler::Scheduler;
use podsync_engine::storage::StorageGateway;
use podsync_engine::utils::fs::expand_tilde;
use podsync_engine::FeedUpdater;

/// `podsync-engine`: turns video-hosting channels into podcast RSS feeds.
#[derive(Parser, Debug)]
#[command(name = "podsync-engine")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file (§6; overridable via
    /// `PODSYNC_CONFIG` as well as this flag, per the spec's
    /// environment-variable overrides).
    #[arg(short, long, value_name = "FILE", env = "PODSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Run one feed's update pipeline to completion, then exit, instead of
    /// starting the scheduler and HTTP server (§4.8 step 1 debug mode).
    #[arg(long, value_name = "FEED_ID")]
    update: Option<String>,

    /// Log level passed to the `tracing` env-filter when `RUST_LOG` is
    /// unset (§4.8 step 2).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("podsync-engine").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

fn open_artifact_store(storage: &StorageSection) -> Result<(Arc<dyn ArtifactStore>, Option<PathBuf>)> {
    match storage {
        StorageSection::Local { data_dir } => {
            let root = expand_tilde(data_dir).context("expanding storage.local.data_dir")?;
            std::fs::create_dir_all(&root)
                .with_context(|| format!("creating data directory {}", root.display()))?;
            Ok((Arc::new(LocalArtifactStore::new(root.clone())), Some(root)))
        }
        StorageSection::RemoteObject {
            endpoint_url,
            region,
            bucket,
            prefix,
            access_key,
            secret_key,
        } => {
            let store = RemoteArtifactStore::new(
                endpoint_url,
                region,
                bucket,
                access_key.as_deref(),
                secret_key.as_deref(),
                prefix.clone(),
            )
            .context("constructing remote object store")?;
            Ok((Arc::new(store), None))
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting podsync-engine");

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let database_dir = expand_tilde(&config.database.directory).context("expanding database.directory")?;
    let storage = Arc::new(
        StorageGateway::open(&database_dir)
            .with_context(|| format!("opening storage at {}", database_dir.display()))?,
    );

    let (artifacts, local_artifact_root) = open_artifact_store(&config.storage)?;

    // Seed every configured feed into the Storage Gateway (§3 lifecycle:
    // "created when added via API or config"). `add_feed` upserts the feed
    // record and is insert-if-absent for episodes, so this is safe to run
    // on every boot — an already-known feed's episodes are left untouched.
    for feed in config.feeds.values() {
        storage
            .add_feed(&feed.id, feed, &[])
            .with_context(|| format!("seeding feed {} into storage", feed.id))?;
    }

    let downloader = Arc::new(
        DownloadDriver::discover(config.downloader.custom_binary.clone(), None)
            .await
            .context("discovering downloader/transcoder binaries")?,
    );

    if config.downloader.self_update {
        let channel = UpdateChannel {
            channel: match config.downloader.update_channel {
                podsync_engine::config::UpdateChannelName::Stable => "stable".to_string(),
                podsync_engine::config::UpdateChannelName::Nightly => "nightly".to_string(),
                podsync_engine::config::UpdateChannelName::Master => "master".to_string(),
            },
            pinned_version: config.downloader.update_version.clone(),
        };
        let driver = Arc::clone(&downloader);
        tokio::spawn(driver.run_self_update_loop(channel));
    }

    let progress = Arc::new(ProgressTracker::new());
    let history = Arc::new(HistoryRecorder::new(Arc::clone(&storage), config.history.enabled));

    // Only a fixture-backed listing adapter ships in this codebase (§1
    // out-of-scope: real network scraping); wiring an empty fixture set
    // here means every provider resolves, but returns `NotFound` until a
    // test or operator seeds one.
    let listing = Arc::new(ListingRegistry::with_fixtures(Fixtures::new()));

    let updater = Arc::new(FeedUpdater::new(
        Arc::clone(&storage),
        Arc::clone(&artifacts),
        Arc::clone(&listing),
        Arc::clone(&downloader),
        Arc::clone(&progress),
        Arc::clone(&history),
        config.server.hostname.clone(),
        config.downloader.timeout(),
    ));

    if let Some(feed_id) = args.update {
        info!(feed_id, "running one-shot update (debug mode)");
        updater
            .update(&feed_id, Trigger::Manual)
            .await
            .with_context(|| format!("updating feed {feed_id}"))?;
        storage.flush().context("flushing storage")?;
        info!(feed_id, "one-shot update complete");
        return Ok(());
    }

    let shutdown = CancellationToken::new();

    let feeds: Vec<_> = config.feeds.values().cloned().collect();
    let updater_for_scheduler = Arc::clone(&updater);
    let on_fire: podsync_engine::scheduler::UpdateFn = Arc::new(move |feed_id: String| {
        let updater = Arc::clone(&updater_for_scheduler);
        Box::pin(async move {
            if let Err(err) = updater.update(&feed_id, Trigger::Scheduled).await {
                error!(feed_id, %err, "scheduled feed update failed");
            }
        })
    });
    let scheduler = Scheduler::start(&feeds, on_fire, shutdown.clone());

    let state = AppState {
        storage: Arc::clone(&storage),
        artifacts: Arc::clone(&artifacts),
        updater: Arc::clone(&updater),
        progress: Arc::clone(&progress),
        history: Arc::clone(&history),
        config: Arc::new(RwLock::new(config.clone())),
        config_path: config_path.clone(),
        shutdown: shutdown.clone(),
        local_artifact_root,
    };

    let bind_address = config.server.bind_address.clone();
    let port = config.server.port;
    let server_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(&bind_address, port, state).await {
            error!(%err, "management API server error");
        }
    });

    info!(port, "management API listening, engine running");
    shutdown_signal().await;
    info!("shutdown signal received, stopping engine");

    shutdown.cancel();
    scheduler.join().await;
    if let Err(err) = server_handle.await {
        warn!(%err, "management API task did not join cleanly");
    }

    storage.flush().context("flushing storage on shutdown")?;
    info!("shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM (§5 "context propagation": this is what
/// cancels the root token every blocking operation observes between
/// episodes).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
