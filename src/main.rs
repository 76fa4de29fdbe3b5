use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use profile_assets::config::{AppConfig, ObjectBackend, RecordBackend};
use profile_assets::coordinator::ProfileAssetCoordinator;
use profile_assets::reconcile::Reconciler;
use profile_assets::storage::{
    CloudinaryObjectStore, InMemoryObjectStore, InMemoryRecordStore, ObjectStore, RecordStore,
    SnapshotRecordStore,
};
use profile_assets::web::{AppState, build_router_with_limit};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "profile_assets", version, about = "User profile service with hosted profile pictures")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Sweep the picture folder for objects no profile references
    Reconcile {
        /// Report orphans without deleting them
        #[arg(long)]
        dry_run: bool,

        /// Leave unreferenced objects younger than this alone
        #[arg(long, default_value_t = 600)]
        grace_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load application configuration")?;

    let records = record_store(&config);
    let objects = object_store(&config)?;

    let coordinator = Arc::new(ProfileAssetCoordinator::new(
        records,
        objects,
        config.coordinator(),
    ));
    coordinator
        .init()
        .await
        .context("failed to initialize record store")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, coordinator).await,
        Command::Reconcile {
            dry_run,
            grace_secs,
        } => reconcile(&coordinator, dry_run, grace_secs).await,
    }
}

fn record_store(config: &AppConfig) -> Arc<dyn RecordStore> {
    match &config.record_backend {
        RecordBackend::Memory => {
            info!("record backend: memory");
            Arc::new(InMemoryRecordStore::new())
        }
        RecordBackend::Snapshot(path) => {
            info!(path = %path.display(), "record backend: snapshot");
            Arc::new(SnapshotRecordStore::new(path))
        }
    }
}

fn object_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    match (config.object_backend, &config.cloudinary) {
        (ObjectBackend::Cloudinary, Some(cloudinary)) => {
            info!(cloud_name = %cloudinary.cloud_name, "object backend: cloudinary");
            let store = CloudinaryObjectStore::new(cloudinary.clone())
                .context("failed to build cloudinary client")?;
            Ok(Arc::new(store))
        }
        (ObjectBackend::Cloudinary, None) => {
            anyhow::bail!("cloudinary backend selected without credentials")
        }
        (ObjectBackend::Memory, _) => {
            info!(base_url = %config.object_base_url, "object backend: memory");
            Ok(Arc::new(InMemoryObjectStore::new(config.object_base_url.clone())))
        }
    }
}

async fn serve(config: &AppConfig, coordinator: Arc<ProfileAssetCoordinator>) -> Result<()> {
    let app = build_router_with_limit(
        AppState::new(Arc::clone(&coordinator)),
        config.max_upload_bytes,
    );

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, folder = %config.picture_folder, "profile service started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    coordinator
        .shutdown()
        .await
        .context("failed to flush record store")?;
    info!("profile service stopped");
    Ok(())
}

async fn reconcile(
    coordinator: &ProfileAssetCoordinator,
    dry_run: bool,
    grace_secs: u64,
) -> Result<()> {
    let reconciler = Reconciler::new(
        Arc::clone(coordinator.records()),
        Arc::clone(coordinator.objects()),
        &coordinator.config().picture_folder,
    )
    .grace(Duration::from_secs(grace_secs));

    let report = reconciler.run(dry_run).await.context("reconciliation failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("profile_assets=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
