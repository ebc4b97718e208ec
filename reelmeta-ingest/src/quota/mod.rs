//! Credential rotation and quota accounting for the authenticated API

pub mod credential;
pub mod governor;
pub mod pool;

pub use credential::{Credential, CredentialSnapshot, CredentialStatus};
pub use governor::{ApiOperation, QuotaCosts, QuotaGovernor, QuotaSnapshot};
pub use pool::{CredentialGrant, CredentialPool};

use thiserror::Error;

/// No credential can absorb the requested cost
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Quota exhausted: no credential can absorb {requested} units ({credential_count} credentials)")]
pub struct QuotaExhausted {
    pub requested: u64,
    pub credential_count: usize,
}
