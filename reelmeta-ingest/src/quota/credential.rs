//! Upstream API credential and its usage window

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of one usage window
pub const WINDOW_LENGTH_HOURS: i64 = 24;

/// Share of the usable budget (in percent) after which a credential reports NearLimit
const NEAR_LIMIT_PERCENT: u64 = 90;

/// Credential status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatus {
    Active,
    NearLimit,
    Exhausted,
    Disabled,
}

impl CredentialStatus {
    /// Whether the credential may be selected for a call
    pub fn is_selectable(&self) -> bool {
        matches!(self, CredentialStatus::Active | CredentialStatus::NearLimit)
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStatus::Active => write!(f, "Active"),
            CredentialStatus::NearLimit => write!(f, "NearLimit"),
            CredentialStatus::Exhausted => write!(f, "Exhausted"),
            CredentialStatus::Disabled => write!(f, "Disabled"),
        }
    }
}

/// One credential for the rate-limited upstream API
///
/// Only [`super::CredentialPool`] mutates these; everything else sees snapshots.
#[derive(Clone)]
pub struct Credential {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) secret: String,
    pub(crate) daily_limit: u64,
    pub(crate) units_used: u64,
    pub(crate) safety_margin: u64,
    pub(crate) window_start: DateTime<Utc>,
    pub(crate) status: CredentialStatus,
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        secret: impl Into<String>,
        daily_limit: u64,
        safety_margin: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut credential = Self {
            id: id.into(),
            name: name.into(),
            secret: secret.into(),
            daily_limit,
            units_used: 0,
            safety_margin,
            window_start: now,
            status: CredentialStatus::Active,
        };
        credential.refresh_status();
        credential
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> CredentialStatus {
        self.status
    }

    pub fn units_used(&self) -> u64 {
        self.units_used
    }

    /// Units usable in one window (daily limit minus safety margin)
    pub fn usable_budget(&self) -> u64 {
        self.daily_limit.saturating_sub(self.safety_margin)
    }

    /// Units still chargeable in the current window
    pub fn headroom(&self) -> u64 {
        self.usable_budget().saturating_sub(self.units_used)
    }

    pub fn can_afford(&self, cost: u64) -> bool {
        self.units_used.saturating_add(cost) <= self.usable_budget()
    }

    /// Whether the usage window has expired at `now`
    pub fn window_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.window_start) >= Duration::hours(WINDOW_LENGTH_HOURS)
    }

    /// Start a fresh window. Disabled credentials stay disabled.
    pub(crate) fn reset_window(&mut self, now: DateTime<Utc>) {
        self.units_used = 0;
        self.window_start = now;
        if self.status != CredentialStatus::Disabled {
            self.status = CredentialStatus::Active;
            self.refresh_status();
        }
    }

    /// Charge `cost` units. Caller must have checked [`Self::can_afford`].
    pub(crate) fn charge(&mut self, cost: u64) {
        debug_assert!(self.can_afford(cost));
        self.units_used += cost;
        self.refresh_status();
    }

    /// Mark a credential that could not fit a call of `cost` units
    pub(crate) fn mark_insufficient(&mut self, cost: u64) {
        if self.status == CredentialStatus::Disabled {
            return;
        }
        self.status = if self.units_used >= self.usable_budget() {
            CredentialStatus::Exhausted
        } else if !self.can_afford(cost) {
            CredentialStatus::NearLimit
        } else {
            self.status
        };
    }

    pub(crate) fn set_disabled(&mut self, disabled: bool) {
        if disabled {
            self.status = CredentialStatus::Disabled;
        } else if self.status == CredentialStatus::Disabled {
            self.status = CredentialStatus::Active;
            self.refresh_status();
        }
    }

    /// Re-derive Active / NearLimit / Exhausted from usage
    fn refresh_status(&mut self) {
        if self.status == CredentialStatus::Disabled {
            return;
        }
        let budget = self.usable_budget();
        self.status = if self.units_used >= budget {
            CredentialStatus::Exhausted
        } else if self.units_used * 100 >= budget * NEAR_LIMIT_PERCENT {
            CredentialStatus::NearLimit
        } else {
            CredentialStatus::Active
        };
    }

    pub fn snapshot(&self) -> CredentialSnapshot {
        CredentialSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            used: self.units_used,
            limit: self.daily_limit,
            safety_margin: self.safety_margin,
            remaining: self.headroom(),
            exceeded: self.units_used >= self.usable_budget(),
            window_start: self.window_start,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .field("daily_limit", &self.daily_limit)
            .field("units_used", &self.units_used)
            .field("safety_margin", &self.safety_margin)
            .field("window_start", &self.window_start)
            .field("status", &self.status)
            .finish()
    }
}

/// Read-only view of one credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSnapshot {
    pub id: String,
    pub name: String,
    pub status: CredentialStatus,
    pub used: u64,
    pub limit: u64,
    pub safety_margin: u64,
    pub remaining: u64,
    pub exceeded: bool,
    pub window_start: DateTime<Utc>,
}
