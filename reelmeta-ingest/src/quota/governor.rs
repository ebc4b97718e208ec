//! Quota governor
//!
//! Front door for every quota-consuming upstream call. Wraps the credential
//! pool with per-operation costs, logging and a periodic window sweep.

use super::credential::{Credential, CredentialSnapshot};
use super::pool::{CredentialGrant, CredentialPool};
use super::QuotaExhausted;
use chrono::{DateTime, Utc};
use reelmeta_common::config::{CredentialEntry, QuotaSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Quota-consuming upstream operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    VideoLookup,
    ChannelLookup,
}

/// Unit cost per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCosts {
    pub video_lookup: u64,
    pub channel_lookup: u64,
}

impl Default for QuotaCosts {
    fn default() -> Self {
        Self {
            video_lookup: 1,
            channel_lookup: 1,
        }
    }
}

/// Aggregate quota status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    /// Units used across all credentials in their current windows
    pub aggregate_used: u64,
    /// Sum of daily limits
    pub aggregate_limit: u64,
    pub credential_count: usize,
    pub per_credential: Vec<CredentialSnapshot>,
}

pub struct QuotaGovernor {
    pool: CredentialPool,
    costs: QuotaCosts,
    /// Budget for credentials added without their own
    default_limit: u64,
    default_margin: u64,
}

impl QuotaGovernor {
    pub fn new(pool: CredentialPool, costs: QuotaCosts) -> Self {
        let defaults = QuotaSettings::default();
        Self {
            pool,
            costs,
            default_limit: defaults.daily_limit,
            default_margin: defaults.safety_margin,
        }
    }

    /// Build from the quota section and the resolved credential list
    ///
    /// Credentials get stable ids (`key-1`, `key-2`, ...) in list order.
    pub fn from_settings(settings: &QuotaSettings, credentials: &[CredentialEntry]) -> Self {
        let now = Utc::now();
        let credentials = credentials
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                Credential::new(
                    format!("key-{}", i + 1),
                    entry.name.clone(),
                    entry.key.clone(),
                    entry.daily_limit.unwrap_or(settings.daily_limit),
                    entry.safety_margin.unwrap_or(settings.safety_margin),
                    now,
                )
            })
            .collect::<Vec<_>>();

        info!(
            credential_count = credentials.len(),
            daily_limit = settings.daily_limit,
            safety_margin = settings.safety_margin,
            "Quota governor initialized"
        );

        Self {
            pool: CredentialPool::new(credentials),
            costs: QuotaCosts {
                video_lookup: settings.video_lookup_cost,
                channel_lookup: settings.channel_lookup_cost,
            },
            default_limit: settings.daily_limit,
            default_margin: settings.safety_margin,
        }
    }

    pub fn cost_of(&self, operation: ApiOperation) -> u64 {
        match operation {
            ApiOperation::VideoLookup => self.costs.video_lookup,
            ApiOperation::ChannelLookup => self.costs.channel_lookup,
        }
    }

    /// Reserve quota for one operation
    pub fn acquire_for(&self, operation: ApiOperation) -> Result<CredentialGrant, QuotaExhausted> {
        self.acquire(self.cost_of(operation))
    }

    /// Reserve `cost` units on some credential
    ///
    /// On success the units are already charged; the caller must use the
    /// returned credential for the call.
    pub fn acquire(&self, cost: u64) -> Result<CredentialGrant, QuotaExhausted> {
        self.acquire_at(cost, Utc::now())
    }

    /// [`Self::acquire`] with an explicit clock
    pub fn acquire_at(&self, cost: u64, now: DateTime<Utc>) -> Result<CredentialGrant, QuotaExhausted> {
        match self.pool.try_charge(cost, now) {
            Ok(grant) => {
                if let Some(previous) = &grant.rotated_from {
                    warn!(
                        from = %previous,
                        to = %grant.credential_id,
                        "Rotated API credential"
                    );
                }
                debug!(
                    credential = %grant.credential_id,
                    cost,
                    remaining = grant.units_remaining,
                    "Quota charged"
                );
                Ok(grant)
            }
            Err(exhausted) => {
                error!(
                    requested = cost,
                    credential_count = exhausted.credential_count,
                    "All API credentials exhausted"
                );
                Err(exhausted)
            }
        }
    }

    pub fn status(&self) -> QuotaSnapshot {
        let per_credential = self.pool.snapshot();
        QuotaSnapshot {
            aggregate_used: per_credential.iter().map(|k| k.used).sum(),
            aggregate_limit: per_credential.iter().map(|k| k.limit).sum(),
            credential_count: per_credential.len(),
            per_credential,
        }
    }

    pub fn set_disabled(&self, credential_id: &str, disabled: bool) -> bool {
        let found = self.pool.set_disabled(credential_id, disabled);
        if found {
            info!(credential = %credential_id, disabled, "Credential availability changed");
        }
        found
    }

    /// Put a new credential into rotation
    ///
    /// Returns its id, or None when the same key is already pooled.
    pub fn add_credential(&self, entry: &CredentialEntry) -> Option<String> {
        let id = self.pool.add(
            &entry.name,
            &entry.key,
            entry.daily_limit.unwrap_or(self.default_limit),
            entry.safety_margin.unwrap_or(self.default_margin),
            Utc::now(),
        );
        match &id {
            Some(id) => info!(credential = %id, name = %entry.name, "Credential added"),
            None => warn!(name = %entry.name, "Credential key already in pool"),
        }
        id
    }

    pub fn remove_credential(&self, credential_id: &str) -> bool {
        let removed = self.pool.remove(credential_id);
        if removed {
            info!(credential = %credential_id, "Credential removed");
        }
        removed
    }

    /// Current credentials as configuration entries
    ///
    /// Budgets equal to the defaults are left unset.
    pub fn credential_entries(&self) -> Vec<CredentialEntry> {
        self.pool
            .credentials()
            .into_iter()
            .map(|c| CredentialEntry {
                name: c.name,
                key: c.secret,
                daily_limit: Some(c.daily_limit).filter(|limit| *limit != self.default_limit),
                safety_margin: Some(c.safety_margin).filter(|margin| *margin != self.default_margin),
            })
            .collect()
    }

    pub fn has_credentials(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Reset expired windows now. Selection also does this lazily.
    pub fn sweep(&self) -> usize {
        self.pool.reset_expired(Utc::now())
    }

    /// Periodic window sweep until `cancel` fires
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Quota sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let reset = self.sweep();
                        if reset > 0 {
                            info!(reset, "Quota sweep reset credentials");
                        }
                    }
                }
            }
        })
    }
}
