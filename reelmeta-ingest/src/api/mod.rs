//! HTTP API handlers for reelmeta-ingest

pub mod extract;
pub mod health;
pub mod quota;
pub mod saves;

pub use extract::extract_routes;
pub use health::health_routes;
pub use quota::quota_routes;
pub use saves::save_routes;
