//! Configuration loading, root folder resolution and atomic TOML writes
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate RECON_CONFIG or RECON_ROOT_FOLDER are marked with
//! #[serial] so they run sequentially.

use recon_common::config::{
    load_or_default, load_toml_config, resolve_config_path, resolve_root_folder,
    write_toml_config, TomlConfig, CONFIG_ENV_VAR, ROOT_FOLDER_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_or_default(Some(&temp_dir.path().join("absent.toml")));
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_invalid_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "this is = = not toml").unwrap();

    assert!(load_toml_config(&path).is_err());
    assert_eq!(load_or_default(Some(&path)), TomlConfig::default());
}

#[test]
fn test_atomic_write_round_trip_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("recon.toml");

    let mut config = TomlConfig::default();
    config.consultation.verify_url = Some("https://api.example.test/verify".to_string());
    config.consultation.primary.client_id = Some("client-a".to_string());
    config.collections.root = "RootList".to_string();

    write_toml_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("recon.toml.tmp").exists());
    assert_eq!(load_toml_config(&target).unwrap(), config);
}

#[test]
fn test_atomic_write_replaces_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("recon.toml");
    std::fs::write(&target, "root_folder = \"/old\"\n").unwrap();

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/new")),
        ..TomlConfig::default()
    };
    write_toml_config(&config, &target).unwrap();

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("/new"));
    assert!(!content.contains("/old"));
}

#[test]
#[serial]
fn test_root_folder_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV_VAR, "/tmp/recon-env-root");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/recon-toml-root")),
        ..TomlConfig::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/tmp/recon-cli-root")), &config);
    assert_eq!(resolved, PathBuf::from("/tmp/recon-cli-root"));

    env::remove_var(ROOT_FOLDER_ENV_VAR);
}

#[test]
#[serial]
fn test_root_folder_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV_VAR, "/tmp/recon-env-root");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/recon-toml-root")),
        ..TomlConfig::default()
    };

    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/tmp/recon-env-root"));

    env::remove_var(ROOT_FOLDER_ENV_VAR);
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/tmp/recon-toml-root"));
}

#[test]
#[serial]
fn test_config_path_from_environment() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/recon-config-test.toml");
    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/recon-config-test.toml"))
    );

    assert_eq!(
        resolve_config_path(Some(Path::new("/etc/recon.toml"))),
        Some(PathBuf::from("/etc/recon.toml"))
    );

    env::remove_var(CONFIG_ENV_VAR);
}
