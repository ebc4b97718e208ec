//! reelmeta-ingest library interface
//!
//! Short-form video metadata ingest: quota-governed credential rotation,
//! concurrent extraction strategies merged by field priority, and dual-sink
//! persistence with rollback and consistency auditing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod fusion;
pub mod quota;
pub mod saver;
pub mod sinks;
pub mod types;
pub mod url;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use crate::config::CredentialFile;
use crate::extractors::HybridExtractor;
use crate::quota::QuotaGovernor;
use crate::saver::UnifiedSaver;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub governor: Arc<QuotaGovernor>,
    pub extractor: Arc<HybridExtractor>,
    pub saver: Arc<UnifiedSaver>,
    /// Deadline for one whole extraction call
    pub call_timeout: Duration,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Where credential changes are saved; unset keeps them in memory only
    pub credential_file: Option<Arc<CredentialFile>>,
}

impl AppState {
    pub fn new(
        governor: Arc<QuotaGovernor>,
        extractor: Arc<HybridExtractor>,
        saver: Arc<UnifiedSaver>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            governor,
            extractor,
            saver,
            call_timeout,
            startup_time: Utc::now(),
            credential_file: None,
        }
    }

    pub fn with_credential_file(mut self, file: CredentialFile) -> Self {
        self.credential_file = Some(Arc::new(file));
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::quota_routes())
        .merge(api::extract_routes())
        .merge(api::save_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
