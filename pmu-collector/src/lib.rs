// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # PMU Collector
//!
//! HTTP service receiving PMU batches. Each batch is decoded, analysed for
//! line frequency and voltage/current phase lag, and appended to a
//! measurement store whose schema is brought up to date at startup.
//!
//! ## Endpoints
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /`, `POST /ingest` | One encoded batch per request |
//! | `GET /health` | Liveness check |
//! | `GET /metrics` | Prometheus text format |
//! | `GET /status` | Version, uptime, last ingest (JSON) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pmu_collector::{build_state, router, CollectorConfig};
//!
//! # async fn demo() -> pmu_collector::Result<()> {
//! let config = CollectorConfig::with_data_dir("/var/lib/pmu");
//! let state = build_state(&config)?;
//! let listener = tokio::net::TcpListener::bind(config.listen).await?;
//! axum::serve(listener, router(state, config.max_body_bytes)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod migration;
pub mod store;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use ingest::{process_batch, AppState, IngestOutcome, IngestSummary};
pub use migration::{MigrationReport, Migrator, SchemaChange, SchemaState, SchemaTarget};
pub use store::{open_store, CsvStore, MeasurementStore, MemoryStore};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use crate::metrics::encode_metrics;
use serde::Serialize;
use std::sync::Arc;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open the configured store and build the shared handler state
pub fn build_state(config: &CollectorConfig) -> Result<Arc<AppState>> {
    let store = open_store(config)?;
    tracing::info!("Using {} store", store.name());
    Ok(Arc::new(AppState::new(store, config)))
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", post(ingest_handler))
        .route("/ingest", post(ingest_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Ingest handler - one batch per request.
async fn ingest_handler(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    match process_batch(&state, &body).await {
        Ok(_) => (StatusCode::OK, "OK".to_string()),
        Err(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_ingest: Option<IngestSummary>,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: VERSION.to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        store: state.store.name(),
        last_ingest: state.last_ingest(),
    })
}
