use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use orgscan::config::ServiceConfig;
use orgscan::jobs::{JobService, Pipeline, job_routes};
use orgscan::store::{JobStore, LibSqlJobStore};
use orgscan::uploads::UploadStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("Invalid configuration")?;

    // Held for the process lifetime so buffered file logs are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("orgscan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Uploads: {}", config.upload_dir.display());
    eprintln!(
        "   GitHub: {} ({})",
        config.directory.base_url,
        if config.directory.token.is_some() {
            "authenticated"
        } else {
            "unauthenticated"
        }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn JobStore> = Arc::new(
        LibSqlJobStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Job service ──────────────────────────────────────────────────────
    let uploads = UploadStore::new(&config.upload_dir)?;
    let pipeline = Pipeline::github(&config.directory)?;
    let service = Arc::new(JobService::new(&config, store, uploads, pipeline));
    service.start().await?;

    if let Some(retention) = config.retention {
        eprintln!("   Retention: {} days", retention.as_secs() / 86_400);
    }

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = job_routes(Arc::clone(&service), config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let dropped = service.shutdown(config.shutdown_grace).await;
    if dropped > 0 {
        eprintln!("   {dropped} queued job(s) were not processed");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Stderr logging, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "orgscan.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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
