//! Health check handlers for worker processes.
//!
//! This module provides reusable Axum handlers for:
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`)
//! - Container stats (`/containers`)
//! - Prometheus metrics (`/metrics`)

use crate::metrics::{self, MetricsCollector};
use crate::registry::ContainerRegistry;
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Registry backing the readiness probe and the stats endpoint.
    pub registry: Arc<ContainerRegistry>,
    /// Collector backing the stats endpoint.
    pub metrics: Arc<MetricsCollector>,
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
}

impl HealthState {
    pub fn new(
        registry: Arc<ContainerRegistry>,
        metrics: Arc<MetricsCollector>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            metrics,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status (always "healthy" if responding).
    pub status: &'static str,
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

/// Liveness probe handler.
///
/// Always returns OK if the server is running.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe handler.
///
/// Ready once at least one container is RUNNING.
pub async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let running = state.registry.running_count();
    let total = state.registry.len();

    if running > 0 {
        Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "running_containers": running,
                "total_containers": total,
            })),
        ))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "running_containers": running,
                "total_containers": total,
            })),
        ))
    }
}

/// Per-container stats as JSON.
pub async fn containers_handler(State(state): State<HealthState>) -> impl IntoResponse {
    Json(state.metrics.snapshot_all())
}

/// Prometheus metrics in text exposition format.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics exporter not initialized",
        )
            .into_response(),
    }
}

/// Router with all health, stats, and metrics endpoints.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/containers", get(containers_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
