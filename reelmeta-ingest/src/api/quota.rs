//! Quota status and credential management
//!
//! GET /quota/status, POST /quota/credentials,
//! PUT and DELETE /quota/credentials/:id

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use reelmeta_common::config::CredentialEntry;
use serde::{Deserialize, Serialize};

use crate::config::is_valid_key;
use crate::error::{ApiError, ApiResult};
use crate::quota::{CredentialStatus, QuotaSnapshot};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialUpdate {
    pub disabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCredential {
    /// Defaults to the assigned id
    #[serde(default)]
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub daily_limit: Option<u64>,
    #[serde(default)]
    pub safety_margin: Option<u64>,
}

/// Operations view of the quota pool
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatusResponse {
    /// Units used across all credentials
    pub used: u64,
    /// Sum of daily limits
    pub daily: u64,
    pub key_count: usize,
    pub all_keys: Vec<KeyStatus>,
}

#[derive(Debug, Serialize)]
pub struct KeyStatus {
    pub id: String,
    pub name: String,
    pub status: CredentialStatus,
    pub used: u64,
    pub limit: u64,
    pub exceeded: bool,
}

impl From<QuotaSnapshot> for QuotaStatusResponse {
    fn from(snapshot: QuotaSnapshot) -> Self {
        Self {
            used: snapshot.aggregate_used,
            daily: snapshot.aggregate_limit,
            key_count: snapshot.credential_count,
            all_keys: snapshot
                .per_credential
                .into_iter()
                .map(|c| KeyStatus {
                    id: c.id,
                    name: c.name,
                    status: c.status,
                    used: c.used,
                    limit: c.limit,
                    exceeded: c.exceeded,
                })
                .collect(),
        }
    }
}

/// GET /quota/status
pub async fn quota_status(State(state): State<AppState>) -> Json<QuotaStatusResponse> {
    Json(state.governor.status().into())
}

/// PUT /quota/credentials/:id
///
/// Disable or re-enable one credential; counters are kept either way.
pub async fn update_credential(
    State(state): State<AppState>,
    Path(credential_id): Path<String>,
    Json(update): Json<CredentialUpdate>,
) -> ApiResult<Json<QuotaStatusResponse>> {
    if !state.governor.set_disabled(&credential_id, update.disabled) {
        return Err(ApiError::NotFound(format!("credential {}", credential_id)));
    }
    Ok(Json(state.governor.status().into()))
}

/// POST /quota/credentials
///
/// 201 with the new pool status; 409 if the key is already pooled.
pub async fn add_credential(
    State(state): State<AppState>,
    Json(new): Json<NewCredential>,
) -> ApiResult<(StatusCode, Json<QuotaStatusResponse>)> {
    if !is_valid_key(&new.key) {
        return Err(ApiError::BadRequest("API key must not be blank".to_string()));
    }

    let entry = CredentialEntry {
        name: new.name.trim().to_string(),
        key: new.key.trim().to_string(),
        daily_limit: new.daily_limit,
        safety_margin: new.safety_margin,
    };
    if state.governor.add_credential(&entry).is_none() {
        return Err(ApiError::Conflict("API key already configured".to_string()));
    }

    save_credentials(&state).await?;
    Ok((StatusCode::CREATED, Json(state.governor.status().into())))
}

/// DELETE /quota/credentials/:id
pub async fn remove_credential(
    State(state): State<AppState>,
    Path(credential_id): Path<String>,
) -> ApiResult<Json<QuotaStatusResponse>> {
    if !state.governor.remove_credential(&credential_id) {
        return Err(ApiError::NotFound(format!("credential {}", credential_id)));
    }

    save_credentials(&state).await?;
    Ok(Json(state.governor.status().into()))
}

async fn save_credentials(state: &AppState) -> ApiResult<()> {
    if let Some(file) = &state.credential_file {
        file.save(&state.governor).await?;
    }
    Ok(())
}

pub fn quota_routes() -> Router<AppState> {
    Router::new()
        .route("/quota/status", get(quota_status))
        .route("/quota/credentials", post(add_credential))
        .route("/quota/credentials/:id", put(update_credential).delete(remove_credential))
}
