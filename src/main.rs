//! Sepsis Prediction Service - Main Entry Point
//!
//! Loads the classifiers once, opens the prediction store and serves the
//! HTTP API until interrupted.

use anyhow::{Context, Result};
use sepsis_prediction_service::{
    config::{AppConfig, LogFormat, LoggingConfig},
    context::AppContext,
    metrics::MetricsReporter,
    server,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "sepsis_prediction_service={},tower_http=info",
            logging.level
        ))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Sepsis Prediction Service");
    info!(
        models_dir = %config.models.models_dir,
        backend = ?config.storage.backend,
        recent_limit = config.history.recent_limit,
        "Configuration loaded successfully"
    );

    let ctx = Arc::new(AppContext::from_config(&config)?);
    info!(
        models = ?ctx.pipeline.model_names(),
        "Inference engine initialized"
    );

    // Periodic metrics summaries
    if config.metrics.report_interval_secs > 0 {
        let reporter =
            MetricsReporter::new(Arc::clone(&ctx.metrics), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let app = server::router(Arc::clone(&ctx), config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Print final summary
    info!("Service shutting down...");
    ctx.metrics.print_summary();

    Ok(())
}
