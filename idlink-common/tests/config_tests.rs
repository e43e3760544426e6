//! Tests for bootstrap configuration resolution
//!
//! Tests that manipulate IDLINK_* environment variables are marked with
//! #[serial] so they never run in parallel with each other.

use idlink_common::config::{
    default_database_path, CliOverrides, ServiceConfig, TomlConfig, ENV_BIND, ENV_DATABASE,
    ENV_LOG, ENV_PORT,
};
use idlink_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

fn clear_env() {
    for key in [ENV_DATABASE, ENV_BIND, ENV_PORT, ENV_LOG] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_defaults_when_nothing_configured() {
    clear_env();

    let config = ServiceConfig::resolve(CliOverrides::default(), TomlConfig::default()).unwrap();

    assert_eq!(config.database_path, default_database_path());
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.port, 5730);
    assert_eq!(config.log_level, "info");
    assert!(!config.cascade_children);
}

#[test]
#[serial]
fn test_file_values_used_without_overrides() {
    clear_env();

    let file = TomlConfig::parse(
        r#"
        database_path = "/srv/idlink/contacts.db"
        port = 6000

        [logging]
        level = "debug"

        [merge]
        cascade_children = true
        "#,
    )
    .unwrap();

    let config = ServiceConfig::resolve(CliOverrides::default(), file).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/srv/idlink/contacts.db"));
    assert_eq!(config.port, 6000);
    assert_eq!(config.log_level, "debug");
    assert!(config.cascade_children);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    env::set_var(ENV_PORT, "7001");
    env::set_var(ENV_DATABASE, "/tmp/idlink-env.db");

    let file = TomlConfig::parse("port = 6000\ndatabase_path = \"/srv/file.db\"").unwrap();
    let config = ServiceConfig::resolve(CliOverrides::default(), file).unwrap();

    assert_eq!(config.port, 7001);
    assert_eq!(config.database_path, PathBuf::from("/tmp/idlink-env.db"));

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(ENV_PORT, "7001");

    let cli = CliOverrides {
        port: Some(8080),
        log_level: Some("trace".to_string()),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(cli, TomlConfig::default()).unwrap();

    assert_eq!(config.port, 8080);
    assert_eq!(config.log_level, "trace");
    assert_eq!(config.listen_addr(), "127.0.0.1:8080");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_port_rejected() {
    clear_env();
    env::set_var(ENV_PORT, "not-a-port");

    let result = ServiceConfig::resolve(CliOverrides::default(), TomlConfig::default());
    assert!(matches!(result, Err(Error::Config(_))));

    clear_env();
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let file = TomlConfig::load_or_default(Some(&missing)).unwrap();
    assert!(file.database_path.is_none());
    assert!(file.port.is_none());
}

#[test]
fn test_malformed_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "port = \"not a number").unwrap();

    let result = TomlConfig::load_or_default(Some(&path));
    assert!(matches!(result, Err(Error::Config(_))));
}
