use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod config;
mod corpus;
mod error;
mod ingestion;
mod ollama;
mod progress;
mod provider;
mod service;

use crate::config::AppConfig;
use crate::service::LecternService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting Lectern service v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(AppConfig::load()?);
    info!(
        host = %config.server.host,
        port = config.server.port,
        ollama = %config.ollama.base_url,
        corpus_mode = ?config.ingestion.corpus_mode,
        "Configuration loaded"
    );

    // Metrics stay optional: the service runs without a recorder
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder, metrics disabled");
            None
        }
    };

    // Ensure the upload staging directory exists
    std::fs::create_dir_all(&config.storage.upload_dir)?;

    let service = Arc::new(LecternService::new(config.clone()).await?);

    let app = api::router(service, metrics);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lectern_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
