//! Setlist Sync - song catalog and BeatBuddy control over MIDI
//!
//! Keeps a setlist of songs, sends the bank/program sequence for the selected
//! song to a drum machine, and shares the selection with every other client
//! on the change bus.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use setlist_sync::bus::ChangeBus;
use setlist_sync::catalog::{
    BlobStore, CatalogStore, FileBlobStore, MemoryBlobStore, SledBlobStore,
};
use setlist_sync::cli;
use setlist_sync::config::{AppConfig, CatalogBackend};
use setlist_sync::controller::MidiController;
use setlist_sync::device::{DeviceSession, MidiPlatform, MidirPlatform, VirtualPlatform};
use setlist_sync::orchestrator::Orchestrator;
use setlist_sync::paths::AppPaths;

/// Setlist Sync - pick songs, drive the BeatBuddy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the detected app location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Use an in-memory BeatBuddy instead of real MIDI hardware
    #[arg(long)]
    virtual_device: bool,

    /// Keep the catalog in memory only
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect();
    paths.ensure_directories()?;

    let _log_guard = init_logging(&args.log_level, &paths.logs_dir)?;

    info!("Starting Setlist Sync...");
    info!("Data directory: {}", paths.base_dir().display());

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config = AppConfig::load_or_default(&config_path).await?;
    info!("Configuration file: {}", config_path.display());

    let platform: Box<dyn MidiPlatform> = if args.virtual_device {
        Box::new(VirtualPlatform::new().with_device("virtual-beatbuddy", "Virtual BeatBuddy"))
    } else {
        Box::new(MidirPlatform::new(config.midi.client_name.clone()))
    };

    let session = Arc::new(DeviceSession::new());
    session
        .initialize(platform.as_ref(), config.midi.init_timeout())
        .await;

    if args.list_ports {
        list_ports_formatted(&session);
        return Ok(());
    }

    match session.auto_bind(config.midi.output_port.as_deref()) {
        Some(output) => info!("Auto-bound output '{}'", output.name),
        None => warn!("No MIDI output bound, sends will be simulated"),
    }

    let backend = open_backend(&config, &paths, args.ephemeral)?;
    info!("Catalog backend: {} (key '{}')", backend.name(), config.catalog.key);
    let catalog = CatalogStore::with_key(backend, config.catalog.key.clone());

    let bus = ChangeBus::new();
    let controller = Arc::new(MidiController::new(session));
    let orchestrator = Orchestrator::attach(catalog, bus, controller);

    info!("✅ Ready, {} songs in catalog", orchestrator.list_songs().len());

    // rustyline blocks on stdin
    let repl = orchestrator.clone();
    tokio::task::spawn_blocking(move || cli::run_repl(repl))
        .await
        .context("REPL task failed")??;

    info!("Setlist Sync shutdown complete");
    Ok(())
}

fn open_backend(config: &AppConfig, paths: &AppPaths, ephemeral: bool) -> Result<Arc<dyn BlobStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryBlobStore::new()));
    }

    let backend: Arc<dyn BlobStore> = match config.catalog.backend {
        CatalogBackend::Sled => Arc::new(SledBlobStore::open(paths.sled_db_path())?),
        CatalogBackend::File => Arc::new(FileBlobStore::new(paths.catalog_dir())?),
        CatalogBackend::Memory => Arc::new(MemoryBlobStore::new()),
    };
    Ok(backend)
}

fn init_logging(level: &str, logs_dir: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(logs_dir, "setlist-sync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

fn list_ports_formatted(session: &DeviceSession) {
    println!("\n{}", "=== Available MIDI Outputs ===".bold().cyan());

    let outputs = session.list_outputs();
    if outputs.is_empty() {
        println!("  {}", "No output ports found".dimmed());
        return;
    }
    for port in outputs {
        println!("  {} {}", port.id.yellow(), port.name);
    }
}
