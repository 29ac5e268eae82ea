//! Dossier Ingestion Service
//!
//! Backlog worker for documents the gateways could not process in-process:
//! 1. Polls for `pending` documents, oldest first
//! 2. Skips uploads still inside the grace period
//! 3. Claims and processes the rest
//! 4. Stops on Ctrl+C / SIGTERM

use dossier_common::{config::AppConfig, db, metrics, telemetry, VERSION};
use dossier_ingestion::{BacklogWorker, DocumentPipeline};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    telemetry::init_tracing(&config.observability);

    info!("Starting Dossier Ingestion Service v{}", VERSION);

    if config.observability.metrics_port > 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }

    let store = db::connect_store(&config.database).await?;
    info!(backend = store.backend(), "Document store ready");

    let pipeline = DocumentPipeline::with_defaults(store)?;
    BacklogWorker::from_config(pipeline, &config.ingestion)
        .run(shutdown_signal())
        .await;

    info!("Ingestion service shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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

    info!("Shutdown signal received");
}
