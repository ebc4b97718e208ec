//! Extraction endpoints
//!
//! POST /extract runs every strategy and returns the merged record.
//! POST /ingest does the same, then saves the record to both sinks.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::saver::{SaveError, SaveTransaction};
use crate::types::{CanonicalRecord, Classification};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub url: String,
    /// Attached to the record before it is saved
    #[serde(default)]
    pub classification: Option<Classification>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub record: CanonicalRecord,
    pub transaction: SaveTransaction,
}

/// POST /extract
pub async fn extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<Json<CanonicalRecord>> {
    let record = state
        .extractor
        .extract_with_deadline(&request.url, state.call_timeout)
        .await?;
    Ok(Json(record))
}

/// POST /ingest
///
/// 201 when both sinks hold the record, 409 when the record was already
/// saved, 503 otherwise; the body always carries the transaction.
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let mut record = state
        .extractor
        .extract_with_deadline(&request.url, state.call_timeout)
        .await?;
    if let Some(classification) = request.classification {
        record.set_classification(classification);
    }

    let transaction = state.saver.save(record.clone()).await;
    tracing::info!(
        record_key = %transaction.record_key,
        state = ?transaction.state(),
        "Ingest finished"
    );

    let status = match &transaction.failure {
        _ if transaction.is_complete() => StatusCode::CREATED,
        Some(SaveError::Duplicate { .. }) => StatusCode::CONFLICT,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((status, Json(IngestResponse { record, transaction })))
}

pub fn extract_routes() -> Router<AppState> {
    Router::new()
        .route("/extract", post(extract))
        .route("/ingest", post(ingest))
}
