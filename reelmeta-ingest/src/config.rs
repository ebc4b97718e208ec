//! Configuration resolution for reelmeta-ingest
//!
//! API credentials come from ENV → TOML, in that priority. Everything else
//! lives in [`reelmeta_common::config::TomlConfig`].

use crate::quota::QuotaGovernor;
use reelmeta_common::config::{load_toml_config, write_toml_config, CredentialEntry, QuotaSettings};
use reelmeta_common::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Comma-separated API keys; replaces `[[quota.credentials]]` when set
pub const API_KEYS_ENV: &str = "REELMETA_YOUTUBE_API_KEYS";

/// Resolve the upstream API credential list
///
/// Keys that are blank or repeated are dropped; the first occurrence wins.
pub fn resolve_credentials(quota: &QuotaSettings) -> Vec<CredentialEntry> {
    let env_keys: Vec<String> = std::env::var(API_KEYS_ENV)
        .ok()
        .map(|raw| raw.split(',').map(|k| k.trim().to_string()).filter(|k| is_valid_key(k)).collect())
        .unwrap_or_default();

    let toml_entries: Vec<CredentialEntry> =
        quota.credentials.iter().filter(|c| is_valid_key(&c.key)).cloned().collect();

    if !env_keys.is_empty() && !toml_entries.is_empty() {
        warn!(
            "API credentials found in environment and TOML config. Using {} (highest priority).",
            API_KEYS_ENV
        );
    }

    let entries = if !env_keys.is_empty() {
        let entries: Vec<CredentialEntry> = env_keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| CredentialEntry {
                name: format!("env-{}", i + 1),
                key,
                daily_limit: None,
                safety_margin: None,
            })
            .collect();
        info!(count = entries.len(), "API credentials loaded from environment variable");
        entries
    } else if !toml_entries.is_empty() {
        info!(count = toml_entries.len(), "API credentials loaded from TOML config");
        toml_entries
    } else {
        info!("No API credentials configured; authenticated strategies disabled");
        Vec::new()
    };

    dedupe(entries)
}

/// Whether the environment supplies the credential list
pub fn credentials_from_env() -> bool {
    std::env::var(API_KEYS_ENV)
        .map(|raw| raw.split(',').any(is_valid_key))
        .unwrap_or(false)
}

/// TOML file that runtime credential changes are written back to
///
/// Writes are serialized so the file always holds the latest pool.
pub struct CredentialFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace `[[quota.credentials]]` with the governor's credentials
    ///
    /// Every other setting in the file is kept.
    pub async fn save(&self, governor: &QuotaGovernor) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let entries = governor.credential_entries();
        let count = entries.len();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut config = load_toml_config(&path)?;
            config.quota.credentials = entries;
            write_toml_config(&config, &path)
        })
        .await
        .map_err(|e| Error::Internal(format!("credential write task failed: {}", e)))??;

        info!(path = %self.path.display(), count, "API credentials written to config");
        Ok(())
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn dedupe(entries: Vec<CredentialEntry>) -> Vec<CredentialEntry> {
    let mut seen = HashSet::new();
    let before = entries.len();
    let unique: Vec<CredentialEntry> = entries.into_iter().filter(|e| seen.insert(e.key.clone())).collect();
    if unique.len() < before {
        warn!(removed = before - unique.len(), "Duplicate API credentials removed");
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn entry(name: &str, key: &str) -> CredentialEntry {
        CredentialEntry {
            name: name.to_string(),
            key: key.to_string(),
            daily_limit: None,
            safety_margin: None,
        }
    }

    fn settings(entries: Vec<CredentialEntry>) -> QuotaSettings {
        QuotaSettings {
            credentials: entries,
            ..Default::default()
        }
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        std::env::set_var(API_KEYS_ENV, "k1, k2,,k1");
        let resolved = resolve_credentials(&settings(vec![entry("primary", "toml-key")]));
        std::env::remove_var(API_KEYS_ENV);

        let keys: Vec<&str> = resolved.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k2"]);
        assert_eq!(resolved[0].name, "env-1");
    }

    #[test]
    #[serial]
    fn test_toml_used_without_env() {
        std::env::remove_var(API_KEYS_ENV);
        let resolved = resolve_credentials(&settings(vec![
            entry("a", "key-a"),
            entry("blank", " "),
            entry("b", "key-b"),
            entry("a-again", "key-a"),
        ]));

        let names: Vec<&str> = resolved.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    #[serial]
    fn test_nothing_configured() {
        std::env::remove_var(API_KEYS_ENV);
        assert!(resolve_credentials(&settings(Vec::new())).is_empty());
        assert!(!credentials_from_env());
    }

    #[test]
    #[serial]
    fn test_blank_env_is_not_a_source() {
        std::env::set_var(API_KEYS_ENV, " , ");
        assert!(!credentials_from_env());
        std::env::set_var(API_KEYS_ENV, "k1");
        assert!(credentials_from_env());
        std::env::remove_var(API_KEYS_ENV);
    }

    #[tokio::test]
    async fn test_credential_file_keeps_other_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reelmeta.toml");
        std::fs::write(
            &path,
            r#"
            [logging]
            level = "debug"

            [quota]
            daily_limit = 100

            [[quota.credentials]]
            name = "old"
            key = "old-key"
            "#,
        )
        .unwrap();

        let quota = load_toml_config(&path).unwrap().quota;
        let governor = QuotaGovernor::from_settings(&quota, &quota.credentials);
        governor.add_credential(&entry("new", "new-key")).unwrap();
        assert!(governor.remove_credential("key-1"));

        CredentialFile::new(&path).save(&governor).await.unwrap();

        let written = load_toml_config(&path).unwrap();
        assert_eq!(written.logging.level, "debug");
        assert_eq!(written.quota.daily_limit, 100);
        assert_eq!(written.quota.credentials, vec![entry("new", "new-key")]);
    }
}
