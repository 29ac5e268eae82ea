//! Dossier API Gateway
//!
//! The HTTP entry point for document ingestion and search.
//! Handles:
//! - Multipart uploads, handed to the in-process worker pool
//! - Search, statistics and document lifecycle
//! - Observability (logging, metrics, request ids)

mod auth;
mod handlers;
mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use dossier_common::{
    config::{AppConfig, IngestionConfig},
    db::{self, DocumentStore},
    metrics, telemetry,
};
use dossier_ingestion::{
    job_queue, BacklogWorker, DocumentPipeline, IngestionService, UploadValidator, WorkerPool,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Room for multipart boundaries and form fields on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub service: IngestionService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    telemetry::init_tracing(&config.observability);

    info!("Starting Dossier API Gateway v{}", dossier_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }

    let store = db::connect_store(&config.database).await?;
    info!(backend = store.backend(), "Document store ready");

    // Background processing
    let pipeline = DocumentPipeline::with_defaults(store.clone())?;
    let (queue, receiver) = job_queue(
        config.ingestion.queue_capacity,
        config.ingestion.max_inflight_bytes,
    );
    let workers = WorkerPool::spawn(pipeline.clone(), receiver, config.ingestion.workers);
    let (stop_backlog, backlog_stopped) = oneshot::channel::<()>();
    let backlog = spawn_local_backlog(store.as_ref(), &pipeline, &config.ingestion, async move {
        let _ = backlog_stopped.await;
    });
    let service = IngestionService::new(
        pipeline,
        UploadValidator::from_config(&config.ingestion),
        queue,
    );

    let state = AppState {
        config: config.clone(),
        store,
        service,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last queue handle; workers now drain and exit.
    info!("Waiting for queued documents to finish processing");
    if tokio::time::timeout(config.shutdown_timeout(), workers.join())
        .await
        .is_err()
    {
        tracing::warn!("Shutdown timeout reached; unfinished documents stay pending for the backlog");
    }

    if let Some(handle) = backlog {
        let _ = stop_backlog.send(());
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Backlog worker exited abnormally");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// An in-process store is not shared with a separate `ingestion` process,
/// so the gateway sweeps its own deferred documents.
fn spawn_local_backlog<F>(
    store: &dyn DocumentStore,
    pipeline: &DocumentPipeline,
    config: &IngestionConfig,
    shutdown: F,
) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    if store.backend() != db::MemoryDocumentStore::BACKEND {
        return None;
    }

    info!("Sweeping the backlog in process");
    let worker = BacklogWorker::from_config(pipeline.clone(), config);
    Some(tokio::spawn(worker.run(shutdown)))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let body_limit = usize::try_from(
        state
            .config
            .ingestion
            .max_upload_bytes
            .saturating_add(MULTIPART_OVERHEAD_BYTES),
    )
    .unwrap_or(usize::MAX);

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Document endpoints
        .route(
            "/documents",
            post(handlers::documents::upload_document).get(handlers::search::search_documents),
        )
        .route("/documents/statistics", get(handlers::search::statistics))
        .route(
            "/documents/{id}",
            get(handlers::documents::get_document)
                .patch(handlers::documents::update_document)
                .delete(handlers::documents::delete_document),
        )
        .route("/documents/{id}/status", get(handlers::documents::get_status))
        .route("/documents/{id}/process", post(handlers::documents::process_document))

        // User endpoints
        .route("/users/{id}/documents", get(handlers::documents::list_user_documents))
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_requests));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
