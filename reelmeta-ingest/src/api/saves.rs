//! Save statistics, reconciliation and consistency endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use reelmeta_common::Platform;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::saver::{ConsistencyReport, RepairReport, SaveStatistics, SaveTransaction};
use crate::AppState;

/// Records compared per sink when no sample size is given
pub const DEFAULT_SAMPLE_SIZE: usize = 50;
pub const MAX_SAMPLE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    pub sample: Option<usize>,
}

impl SampleQuery {
    fn size(&self) -> ApiResult<usize> {
        match self.sample.unwrap_or(DEFAULT_SAMPLE_SIZE) {
            0 => Err(ApiError::BadRequest("sample must be at least 1".to_string())),
            n if n > MAX_SAMPLE_SIZE => Err(ApiError::BadRequest(format!(
                "sample must be at most {}",
                MAX_SAMPLE_SIZE
            ))),
            n => Ok(n),
        }
    }
}

/// GET /saves/statistics?platform=
pub async fn save_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> ApiResult<Json<SaveStatistics>> {
    let platform = query.platform.as_deref().map(str::parse::<Platform>).transpose()?;
    Ok(Json(state.saver.get_save_statistics(platform)))
}

/// GET /saves/reconciliation
pub async fn reconciliation(State(state): State<AppState>) -> Json<Vec<SaveTransaction>> {
    Json(state.saver.pending_reconciliation())
}

/// GET /consistency/:platform?sample=
pub async fn consistency_report(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<SampleQuery>,
) -> ApiResult<Json<ConsistencyReport>> {
    let platform: Platform = platform.parse()?;
    let report = state.saver.validate_data_consistency(platform, query.size()?).await?;
    Ok(Json(report))
}

/// POST /consistency/:platform/repair?sample=
pub async fn repair_consistency(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<SampleQuery>,
) -> ApiResult<Json<RepairReport>> {
    let platform: Platform = platform.parse()?;
    let report = state.saver.repair_consistency(platform, query.size()?).await?;
    tracing::info!(
        platform = %platform,
        repaired = report.repaired_keys.len(),
        unresolved = report.unresolved_keys.len(),
        "Consistency repair finished"
    );
    Ok(Json(report))
}

pub fn save_routes() -> Router<AppState> {
    Router::new()
        .route("/saves/statistics", get(save_statistics))
        .route("/saves/reconciliation", get(reconciliation))
        .route("/consistency/:platform", get(consistency_report))
        .route("/consistency/:platform/repair", post(repair_consistency))
}
