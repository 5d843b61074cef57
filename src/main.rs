use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use movie_catalog_worker::config::Config;
use movie_catalog_worker::db::Database;
use movie_catalog_worker::jobs::{self, worker::QueueWorker};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting movie-catalog-worker");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Ensure data directories exist
    tokio::fs::create_dir_all(&config.dataset_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create dataset directory: {}",
                config.dataset_dir.display()
            )
        })?;

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    // Initialize database
    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    // One-shot producer mode for operators:
    //   movie-catalog-worker enqueue <job-name> [payload-json]
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("enqueue") {
        let name = args
            .get(1)
            .context("Usage: movie-catalog-worker enqueue <job-name> [payload-json]")?;
        let payload = match args.get(2) {
            Some(raw) => serde_json::from_str(raw).context("Payload must be valid JSON")?,
            None => serde_json::json!({}),
        };
        let job_id = jobs::enqueue_job(db.pool(), name, payload, config.max_attempts).await?;
        info!(job_id, kind = %name, "Job enqueued");
        return Ok(());
    }

    // Start the queue worker in background
    let worker = QueueWorker::new(config, db);

    // Put back any jobs interrupted by an unclean shutdown
    if let Err(e) = worker.recover_on_startup().await {
        error!("Failed to recover jobs on startup: {e:#}");
    }

    let worker_handle = tokio::spawn(async move {
        worker.run().await;
    });
    info!("Queue worker started");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down...");

    worker_handle.abort();

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,movie_catalog_worker=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
