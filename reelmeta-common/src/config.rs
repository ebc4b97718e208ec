//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "reelmeta.db";

/// TOML configuration file contents
///
/// Every section has defaults so a missing file or a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder for the database and other state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub quota: QuotaSettings,

    #[serde(default)]
    pub extraction: ExtractionSettings,

    #[serde(default)]
    pub saver: SaverSettings,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Upstream API quota section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaSettings {
    /// Default daily unit budget per credential
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    /// Units held back below the daily limit
    #[serde(default = "default_safety_margin")]
    pub safety_margin: u64,

    /// Cost of one video lookup in quota units
    #[serde(default = "default_lookup_cost")]
    pub video_lookup_cost: u64,

    /// Cost of one channel lookup in quota units
    #[serde(default = "default_lookup_cost")]
    pub channel_lookup_cost: u64,

    /// Interval of the background daily-window sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialEntry>,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            safety_margin: default_safety_margin(),
            video_lookup_cost: default_lookup_cost(),
            channel_lookup_cost: default_lookup_cost(),
            sweep_interval_secs: default_sweep_interval(),
            credentials: Vec::new(),
        }
    }
}

fn default_daily_limit() -> u64 {
    10_000
}

fn default_safety_margin() -> u64 {
    500
}

fn default_lookup_cost() -> u64 {
    1
}

fn default_sweep_interval() -> u64 {
    300
}

/// One upstream API credential
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialEntry {
    pub name: String,
    pub key: String,
    /// Overrides `quota.daily_limit` for this credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u64>,
    /// Overrides `quota.safety_margin` for this credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_margin: Option<u64>,
}

/// Extraction section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSettings {
    /// Per-strategy timeout
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,

    /// Caller-level timeout for one whole extraction call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Request pacing for the authenticated API
    #[serde(default = "default_requests_per_second")]
    pub api_requests_per_second: u32,

    #[serde(default = "default_youtube_api_base_url")]
    pub youtube_api_base_url: String,

    #[serde(default = "get_user_agent")]
    pub user_agent: String,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            strategy_timeout_ms: default_strategy_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            api_requests_per_second: default_requests_per_second(),
            youtube_api_base_url: default_youtube_api_base_url(),
            user_agent: get_user_agent(),
        }
    }
}

fn default_strategy_timeout_ms() -> u64 {
    10_000
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_youtube_api_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

/// Saver section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaverSettings {
    /// Worker pool size for concurrent save transactions
    #[serde(default = "default_max_concurrent_saves")]
    pub max_concurrent_saves: usize,

    /// Document delete attempts when rolling back (1 = single attempt)
    #[serde(default = "default_rollback_attempts")]
    pub rollback_attempts: u32,

    /// Initial backoff between rollback attempts
    #[serde(default = "default_rollback_backoff_ms")]
    pub rollback_backoff_ms: u64,
}

impl Default for SaverSettings {
    fn default() -> Self {
        Self {
            max_concurrent_saves: default_max_concurrent_saves(),
            rollback_attempts: default_rollback_attempts(),
            rollback_backoff_ms: default_rollback_backoff_ms(),
        }
    }
}

fn default_max_concurrent_saves() -> usize {
    4
}

fn default_rollback_attempts() -> u32 {
    1
}

fn default_rollback_backoff_ms() -> u64 {
    50
}

/// User-Agent sent with every outbound HTTP request
pub fn get_user_agent() -> String {
    format!(
        "reelmeta/{} ( +https://github.com/reelmeta/reelmeta )",
        env!("CARGO_PKG_VERSION")
    )
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: Option<&TomlConfig>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root) = toml_config.and_then(|c| c.root_folder.as_ref()) {
        return root.clone();
    }

    get_default_root_folder()
}

/// Locate the default configuration file for the platform
///
/// Linux checks `~/.config/reelmeta/config.toml`, then `/etc/reelmeta/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("reelmeta").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/reelmeta/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("reelmeta"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/reelmeta"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("reelmeta"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/reelmeta"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("reelmeta"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\reelmeta"))
    } else {
        PathBuf::from("./reelmeta_data")
    }
}

/// Load a TOML config file
///
/// A missing file yields the default configuration.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = TomlConfig::default();
        assert_eq!(config.quota.daily_limit, 10_000);
        assert_eq!(config.quota.safety_margin, 500);
        assert_eq!(config.saver.rollback_attempts, 1);
        assert!(config.extraction.user_agent.starts_with("reelmeta/"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [quota]
            safety_margin = 0

            [[quota.credentials]]
            name = "primary"
            key = "abc"
            daily_limit = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.quota.safety_margin, 0);
        assert_eq!(config.quota.daily_limit, 10_000);
        assert_eq!(config.quota.credentials.len(), 1);
        assert_eq!(config.quota.credentials[0].daily_limit, Some(5));
        assert_eq!(config.saver.max_concurrent_saves, 4);
    }

    #[test]
    fn test_cli_arg_wins() {
        let cli = PathBuf::from("/tmp/cli-root");
        let resolved = resolve_root_folder(Some(&cli), "REELMETA_TEST_UNSET_VAR", None);
        assert_eq!(resolved, cli);
    }
}
