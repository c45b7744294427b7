use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::load_config;
use super::settings::{PartialSettings, PartialUpstreamSettings, Settings};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 3000);
    assert_eq!(settings.upstream.topic, "#");
    assert_eq!(settings.upstream.connect_attempts, 5);
    assert_eq!(settings.hub.backlog, 1024);
    assert_eq!(settings.log.level, "info");
    assert!(settings.validate().is_ok());
}

#[test]
fn test_merge_keeps_defaults_for_missing_fields() {
    let partial = PartialSettings {
        upstream: Some(PartialUpstreamSettings {
            topic: Some("sensors/temp".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let settings = Settings::merge(partial);
    assert_eq!(settings.upstream.topic, "sensors/temp");
    assert_eq!(settings.upstream.uri, "mqtt://127.0.0.1:1883");
    assert_eq!(settings.server.port, 3000);
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut settings = Settings::default();
    settings.upstream.topic = "  ".to_string();
    assert_eq!(settings.validate().unwrap_err().key, "upstream.topic");

    let mut settings = Settings::default();
    settings.hub.backlog = 0;
    assert_eq!(settings.validate().unwrap_err().key, "hub.backlog");

    let mut settings = Settings::default();
    settings.upstream.connect_attempts = 0;
    assert_eq!(
        settings.validate().unwrap_err().key,
        "upstream.connect_attempts"
    );
}

#[test]
#[serial]
fn test_load_config_from_json_in_working_dir() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let json = r#"{
        "upstream": {
            "uri": "iot.example.com",
            "topic": "devices/+/state",
            "username": "relay",
            "password": "s3cret"
        },
        "server": { "port": 3100 }
    }"#;
    fs::write("config.json", json).expect("write config file");

    let cfg = load_config(None);
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.upstream.uri, "iot.example.com");
    assert_eq!(cfg.upstream.topic, "devices/+/state");
    assert_eq!(cfg.upstream.username, "relay");
    assert_eq!(cfg.upstream.password, "s3cret");
    assert_eq!(cfg.server.port, 3100);
    assert_eq!(cfg.server.host, "127.0.0.1");
}

#[test]
#[serial]
fn test_load_config_from_explicit_path() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("relay.toml");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [hub]
        backlog = 16

        [log]
        level = "debug"
    "#;
    fs::write(&path, toml).expect("write config file");

    let cfg = load_config(Some(&path)).expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.hub.backlog, 16);
    assert_eq!(cfg.log.level, "debug");
}

#[test]
#[serial]
fn test_load_config_missing_explicit_path_fails() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("missing.toml");
    assert!(load_config(Some(&path)).is_err());
}

#[test]
#[serial]
fn test_environment_overrides_files() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("relay.toml");
    fs::write(&path, "[upstream]\ntopic = \"from-file\"\n").expect("write config file");

    temp_env::with_vars(
        [
            ("RELAY_UPSTREAM__TOPIC", Some("from-env")),
            ("RELAY_SERVER__PORT", Some("4100")),
        ],
        || {
            let cfg = load_config(Some(&path)).expect("load_config failed");
            assert_eq!(cfg.upstream.topic, "from-env");
            assert_eq!(cfg.server.port, 4100);
        },
    );
}

#[test]
#[serial]
fn test_load_flat_config_json_in_working_dir() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let json = r#"{
        "uri": "broker.example.com",
        "topic": "sensors/temp",
        "username": "u",
        "password": "p"
    }"#;
    fs::write("config.json", json).expect("write config file");

    let cfg = load_config(None);
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.upstream.uri, "broker.example.com");
    assert_eq!(cfg.upstream.topic, "sensors/temp");
    assert_eq!(cfg.upstream.username, "u");
    assert_eq!(cfg.upstream.password, "p");
    assert_eq!(cfg.server.port, 3000);
}

#[test]
fn test_nested_upstream_keys_win_over_flat_ones() {
    let partial = PartialSettings {
        upstream: Some(PartialUpstreamSettings {
            topic: Some("nested".to_string()),
            ..Default::default()
        }),
        topic: Some("flat".to_string()),
        uri: Some("flat.example.com".to_string()),
        ..Default::default()
    };
    let settings = Settings::merge(partial);
    assert_eq!(settings.upstream.topic, "nested");
    assert_eq!(settings.upstream.uri, "flat.example.com");
}
