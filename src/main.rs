use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use skillswap_annotations::{AnnotationStore, SqliteBackend};
use skillswap_core::{Config, Engine, coalescer};
use skillswap_gateway::GatewayServer;
use skillswap_ledger::InMemoryLedger;
use skillswap_ledger::snapshot::seed_from_file;
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "skillswap", version, about = "Skill exchange profile sync and matching")]
struct Cli {
    /// Config file (default: $SKILLSWAP_CONFIG, then config/default.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one refresh, print the merged participant table, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let annotations = Arc::new(open_annotations(&config).await);
    let ledger = Arc::new(
        InMemoryLedger::new(config.sync.channel_capacity)
            .with_scheme(config.ledger.fingerprint_scheme.into()),
    );
    if let Some(path) = &config.ledger.snapshot_path {
        seed_from_file(&ledger, Path::new(path)).context("failed to seed ledger snapshot")?;
    }

    let mut engine = Engine::new(Arc::clone(&ledger), annotations);
    if let Some(identity) = config.local_identity() {
        tracing::info!(identity = %identity.short(), "local participant configured");
        engine = engine.with_local_identity(identity);
    }
    let engine = Arc::new(engine);

    if cli.once {
        engine.refresh().await?;
        print_table(&engine);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let sync = coalescer::spawn(Arc::clone(&engine), shutdown_rx.clone());

    let gateway = if config.gateway.enabled {
        let server = GatewayServer::from_config(&config.gateway, Arc::clone(&engine), shutdown_rx);
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                tracing::error!("gateway error: {e}");
            }
        }))
    } else {
        tracing::info!("gateway disabled");
        None
    };

    sync.await.context("view sync task failed")?;
    if let Some(gateway) = gateway {
        gateway.await.context("gateway task failed")?;
    }
    Ok(())
}

async fn open_annotations(config: &Config) -> AnnotationStore {
    let Some(path) = config.annotations.persistence_path() else {
        tracing::info!("annotation persistence disabled, keeping annotations in memory");
        return AnnotationStore::memory_only();
    };

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::warn!("failed to create {}: {e}", parent.display());
    }

    match SqliteBackend::open(path).await {
        Ok(backend) => {
            let store = AnnotationStore::open(Box::new(backend)).await;
            tracing::info!(entries = store.len(), "annotations loaded from {path}");
            store
        }
        Err(e) => {
            tracing::warn!("failed to open annotation database {path}: {e}; keeping annotations in memory");
            AnnotationStore::memory_only()
        }
    }
}

fn print_table(engine: &Engine<InMemoryLedger>) {
    for view in engine.list_merged_views() {
        println!(
            "{:>4}  {:<20}  teaches {:<24}  learns {}",
            view.id.get(),
            view.display_name,
            view.teach_display,
            view.learn_display
        );
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
