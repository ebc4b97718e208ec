//! # reelmeta common library
//!
//! Shared code for the reelmeta ingest service and its tooling:
//! - Error type shared across crates
//! - Configuration loading and root folder resolution
//! - Platform classification of content URLs
//! - The canonical field vocabulary used by every extraction strategy

pub mod config;
pub mod error;
pub mod fields;
pub mod platform;

pub use error::{Error, Result};
pub use fields::{FieldName, FieldValue};
pub use platform::Platform;
