//! resmatch-api - HTTP API server for resmatch

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resmatch_api::{router, AppState, ServerConfig};
use resmatch_engine::{EngineConfig, KeywordMatchingEngine};
use resmatch_jobs::{
    job_queue, sweeper, ArtifactStore, FilesystemArtifactStore, JobService, JobStore,
    MatchingEngine, ProgressBroadcaster, StreamConfig, SweeperConfig, WorkerBuilder,
    WorkerConfig, WorkerEvent,
};

/// How long shutdown waits for in-flight jobs before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "resmatch_api=debug,resmatch_jobs=debug,resmatch_engine=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("resmatch-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env();

    // Matching engine
    let engine: Arc<dyn MatchingEngine> =
        Arc::new(KeywordMatchingEngine::from_config(&EngineConfig::from_env())?);

    // Artifact storage
    let filesystem = FilesystemArtifactStore::new(&config.upload_dir);
    filesystem.init().await?;
    info!(path = %filesystem.base_path().display(), "Artifact storage ready");
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(filesystem);

    // Job runtime
    let broadcaster = Arc::new(ProgressBroadcaster::new(StreamConfig::from_env()));
    let store = Arc::new(JobStore::new(broadcaster));
    let (queue, receiver) = job_queue();

    let workers = WorkerBuilder::new(store.clone(), receiver, engine, artifacts.clone())
        .with_config(WorkerConfig::from_env())
        .build()
        .start();
    tokio::spawn(log_worker_events(workers.events()));

    let sweeper_cancel = CancellationToken::new();
    let sweeper_handle = tokio::spawn(sweeper::run(
        store.clone(),
        SweeperConfig::from_env(),
        sweeper_cancel.clone(),
    ));

    let service =
        JobService::new(store, queue, artifacts).with_max_batch_size(config.max_batch_size);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = router(AppState::new(service, config));

    // Start server
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped accepting connections, cleaning up");

    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;

    workers.shutdown();
    match tokio::time::timeout(SHUTDOWN_GRACE, workers.join()).await {
        Ok(Ok(())) => info!("Job workers stopped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Job worker exited abnormally"),
        Err(_) => tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Job workers did not stop in time"
        ),
    }

    info!("Graceful shutdown complete");
    Ok(())
}

/// Log worker lifecycle events until the pool shuts down.
async fn log_worker_events(mut rx: tokio::sync::broadcast::Receiver<WorkerEvent>) {
    loop {
        match rx.recv().await {
            Ok(WorkerEvent::JobFailed { job_id, error }) => {
                tracing::warn!(job_id = %job_id, error = %error, "Job failed");
            }
            Ok(event) => tracing::debug!(?event, "Worker event"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(missed = n, "Worker event listener lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for SIGINT or SIGTERM.
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
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT (Ctrl-C), starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
