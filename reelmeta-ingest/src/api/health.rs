//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" while saves await reconciliation
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub pending_reconciliation: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let pending_reconciliation = state.saver.pending_reconciliation().len();
    let status = if pending_reconciliation == 0 { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "reelmeta-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        pending_reconciliation,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
