//! Integration tests for configuration loading and root folder resolution
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate REELMETA_ROOT_FOLDER are marked with #[serial].

use reelmeta_common::config::{
    load_toml_config, resolve_root_folder, write_toml_config, CredentialEntry, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_write_then_load_preserves_credentials() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/srv/reelmeta"));
    config.quota.credentials.push(CredentialEntry {
        name: "primary".to_string(),
        key: "key-one".to_string(),
        daily_limit: Some(2_000),
        safety_margin: None,
    });

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded.root_folder, Some(PathBuf::from("/srv/reelmeta")));
    assert_eq!(loaded.quota.credentials.len(), 1);
    assert_eq!(loaded.quota.credentials[0].daily_limit, Some(2_000));
    assert!(!path.with_extension("toml.tmp").exists(), "temp file should be renamed away");
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "[quota\nsafety_margin = ").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var("REELMETA_ROOT_FOLDER", "/env/root");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/toml/root"));

    let resolved = resolve_root_folder(None, "REELMETA_ROOT_FOLDER", Some(&config));
    env::remove_var("REELMETA_ROOT_FOLDER");

    assert_eq!(resolved, PathBuf::from("/env/root"));
}

#[test]
#[serial]
fn test_toml_used_when_env_unset() {
    env::remove_var("REELMETA_ROOT_FOLDER");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/toml/root"));

    let resolved = resolve_root_folder(None, "REELMETA_ROOT_FOLDER", Some(&config));
    assert_eq!(resolved, PathBuf::from("/toml/root"));
}

#[test]
#[serial]
fn test_default_when_nothing_configured() {
    env::remove_var("REELMETA_ROOT_FOLDER");

    let resolved = resolve_root_folder(None, "REELMETA_ROOT_FOLDER", None);
    assert!(!resolved.as_os_str().is_empty());
    assert!(resolved.to_string_lossy().contains("reelmeta"));
}
