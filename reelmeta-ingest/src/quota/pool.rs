//! Credential pool with rotation
//!
//! All selection, charging and status changes happen under one lock, so
//! concurrent callers never overdraw a credential and never observe a
//! half-applied rotation.

use super::credential::{Credential, CredentialSnapshot, CredentialStatus};
use super::QuotaExhausted;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// A successful charge against one credential
#[derive(Clone)]
pub struct CredentialGrant {
    pub credential_id: String,
    pub credential_name: String,
    /// Secret to attach to the upstream call
    pub secret: String,
    pub units_charged: u64,
    /// Units left on the charged credential
    pub units_remaining: u64,
    /// Set when this charge moved the pool off a different credential
    pub rotated_from: Option<String>,
}

impl fmt::Debug for CredentialGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGrant")
            .field("credential_id", &self.credential_id)
            .field("credential_name", &self.credential_name)
            .field("secret", &"<redacted>")
            .field("units_charged", &self.units_charged)
            .field("units_remaining", &self.units_remaining)
            .field("rotated_from", &self.rotated_from)
            .finish()
    }
}

struct PoolState {
    credentials: Vec<Credential>,
    current: usize,
}

/// Ordered set of credentials for one upstream API
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                credentials,
                current: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every mutation completes before the guard drops, so a poisoned
        // lock still holds consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Charge `cost` units to the first credential (starting at the current
    /// one) that can absorb it without crossing its safety margin.
    ///
    /// Expired windows are reset before selection. Credentials that cannot
    /// absorb the cost are marked NearLimit or Exhausted and skipped.
    pub fn try_charge(&self, cost: u64, now: DateTime<Utc>) -> Result<CredentialGrant, QuotaExhausted> {
        let mut state = self.lock();
        reset_expired_locked(&mut state, now);

        let count = state.credentials.len();
        let start = state.current;

        for offset in 0..count {
            let idx = (start + offset) % count;
            let credential = &mut state.credentials[idx];

            if !credential.status().is_selectable() {
                continue;
            }

            if !credential.can_afford(cost) {
                credential.mark_insufficient(cost);
                continue;
            }

            credential.charge(cost);
            let grant = CredentialGrant {
                credential_id: credential.id.clone(),
                credential_name: credential.name.clone(),
                secret: credential.secret.clone(),
                units_charged: cost,
                units_remaining: credential.headroom(),
                rotated_from: None,
            };

            let rotated_from = if idx != start {
                Some(state.credentials[start].id.clone())
            } else {
                None
            };
            state.current = idx;

            return Ok(CredentialGrant {
                rotated_from,
                ..grant
            });
        }

        Err(QuotaExhausted {
            requested: cost,
            credential_count: count,
        })
    }

    /// Reset every credential whose window has expired. Returns how many were reset.
    pub fn reset_expired(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        reset_expired_locked(&mut state, now)
    }

    /// Take a credential out of rotation (or put it back)
    ///
    /// Returns false when no credential has that id.
    pub fn set_disabled(&self, credential_id: &str, disabled: bool) -> bool {
        let mut state = self.lock();
        match state.credentials.iter_mut().find(|c| c.id == credential_id) {
            Some(credential) => {
                credential.set_disabled(disabled);
                true
            }
            None => false,
        }
    }

    /// Append a credential under the next free `key-N` id
    ///
    /// Returns the new id, or None when the secret is already pooled.
    pub fn add(
        &self,
        name: &str,
        secret: &str,
        daily_limit: u64,
        safety_margin: u64,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let mut state = self.lock();
        if state.credentials.iter().any(|c| c.secret == secret) {
            return None;
        }

        let mut n = state.credentials.len() + 1;
        while state.credentials.iter().any(|c| c.id == format!("key-{}", n)) {
            n += 1;
        }
        let id = format!("key-{}", n);
        let name = if name.trim().is_empty() { id.as_str() } else { name };

        state
            .credentials
            .push(Credential::new(id.clone(), name, secret, daily_limit, safety_margin, now));
        Some(id)
    }

    /// Drop a credential and its counters
    ///
    /// Rotation continues from the credential after the removed one.
    pub fn remove(&self, credential_id: &str) -> bool {
        let mut state = self.lock();
        let Some(idx) = state.credentials.iter().position(|c| c.id == credential_id) else {
            return false;
        };
        state.credentials.remove(idx);

        if idx < state.current {
            state.current -= 1;
        }
        if state.current >= state.credentials.len() {
            state.current = 0;
        }
        true
    }

    /// Full copies, secrets included, for writing the configuration back
    pub(crate) fn credentials(&self) -> Vec<Credential> {
        self.lock().credentials.clone()
    }

    /// Consistent copy of every credential's state
    pub fn snapshot(&self) -> Vec<CredentialSnapshot> {
        self.lock().credentials.iter().map(Credential::snapshot).collect()
    }

    /// Id of the credential the next charge will try first
    pub fn current_id(&self) -> Option<String> {
        let state = self.lock();
        state.credentials.get(state.current).map(|c| c.id.clone())
    }
}

fn reset_expired_locked(state: &mut PoolState, now: DateTime<Utc>) -> usize {
    let mut reset = 0;
    for credential in state.credentials.iter_mut() {
        if credential.window_expired(now) {
            tracing::info!(
                credential = %credential.id,
                units_used = credential.units_used,
                "Quota window expired, resetting credential"
            );
            credential.reset_window(now);
            reset += 1;
        }
    }

    // Return to the first selectable credential once usage starts over
    if reset > 0 {
        if let Some(first) = state
            .credentials
            .iter()
            .position(|c| c.status() == CredentialStatus::Active)
        {
            state.current = first;
        }
    }
    reset
}
