//! Observability HTTP surface: `/metrics`, `/health`, `/startup-status`
//! (spec §6). Built the way the teacher's `run_health_server` builds its
//! axum router, with the routes renamed and `/startup-status` added per
//! spec's exact path table.

use crate::credentials::CredentialReconciler;
use crate::server::metrics::SharedMetrics;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct ServerState {
    metrics: SharedMetrics,
    credentials: Arc<CredentialReconciler>,
}

impl ServerState {
    pub fn new(metrics: SharedMetrics, credentials: Arc<CredentialReconciler>) -> Self {
        Self {
            metrics,
            credentials,
        }
    }
}

/// `GET /health` — always 200; the process is alive.
async fn health() -> StatusCode {
    StatusCode::OK
}

/// `GET /startup-status` — 200 iff every target credential path exists
/// with size > 0 (P8); 503 otherwise.
async fn startup_status(State(state): State<ServerState>) -> impl IntoResponse {
    let missing = state.credentials.missing_slots();
    if missing.is_empty() {
        (
            StatusCode::OK,
            Json(json!({"status": "ready", "message": "all credentials provisioned"})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "message": format!("waiting on credentials: {}", missing.join(", ")),
            })),
        )
    }
}

/// `GET /metrics` — Prometheus text format.
async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

pub async fn run_health_server(
    port: u16,
    metrics: SharedMetrics,
    credentials: Arc<CredentialReconciler>,
) -> Result<(), std::io::Error> {
    let state = ServerState::new(metrics, credentials);

    let app = Router::new()
        .route("/health", get(health))
        .route("/startup-status", get(startup_status))
        .route("/metrics", get(self::metrics))
        .fallback(not_found)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "observability server listening");

    axum::serve(listener, app)
        .await
        .map_err(std::io::Error::other)
}

#[cfg(test)]
#[path = "health_test.rs"]
mod tests;
