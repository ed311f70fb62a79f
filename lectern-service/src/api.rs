//! HTTP API for the Lectern service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Document upload and ingestion status
//! - Question answering

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::LecternService;

pub mod documents;
pub mod query;
use documents::{ingestion_events_handler, ingestion_status_handler, upload_documents_handler};
use query::query_handler;

/// Application state
pub struct AppState {
    pub service: Arc<LecternService>,
    pub start_time: Instant,
    /// Installed Prometheus recorder, if any
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(service: Arc<LecternService>, metrics: Option<PrometheusHandle>) -> Router {
    let max_body_size = service.config.limits.max_upload_size_bytes as usize;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/documents",
            post(upload_documents_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/ingestion/status", get(ingestion_status_handler))
        .route("/ingestion/events", get(ingestion_events_handler))
        .route("/query", post(query_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let provider_available = state.service.provider_available().await;

    let status = if provider_available {
        "healthy".to_string()
    } else {
        "degraded: Ollama unavailable".to_string()
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        ollama_available: provider_available,
        corpus_chunks: state.service.corpus.len(),
        embedding_dimension: state.service.corpus.dimension(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    ollama_available: bool,
    corpus_chunks: usize,
    embedding_dimension: Option<usize>,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
