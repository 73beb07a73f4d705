//! Unit tests for exchange configuration parsing and validation.

use std::io::Write;
use std::time::Duration;

use object_exchange::config::validate_channel_name;
use object_exchange::{AppError, ExchangeConfig, ExchangeRole, ExchangeSettings};

fn sample_toml() -> &'static str {
    r#"
channel_name = "Channel"
role = "connector"
connect_timeout_ms = 250
reconnect_interval_ms = 500
max_frame_bytes = 4096
"#
}

#[test]
fn parses_full_config() {
    let config = ExchangeConfig::from_toml_str(sample_toml()).expect("valid config");
    assert_eq!(config.channel_name, "Channel");
    assert_eq!(config.role, ExchangeRole::Connector);
    assert_eq!(config.connect_timeout_ms, 250);
    assert_eq!(config.reconnect_interval_ms, 500);
    assert_eq!(config.max_frame_bytes, 4096);
}

#[test]
fn minimal_config_uses_defaults() {
    let config = ExchangeConfig::from_toml_str(
        r#"
channel_name = "Channel"
role = "listener"
"#,
    )
    .expect("valid config");
    assert_eq!(config.role, ExchangeRole::Listener);
    assert_eq!(config.settings(), ExchangeSettings::default());
}

#[test]
fn default_settings_match_documented_timings() {
    let settings = ExchangeSettings::default();
    assert_eq!(settings.connect_timeout, Duration::from_millis(1000));
    assert_eq!(settings.reconnect_interval, Duration::from_millis(2000));
    assert_eq!(settings.max_frame_bytes, 1_048_576);
}

#[test]
fn settings_convert_milliseconds() {
    let config = ExchangeConfig::from_toml_str(sample_toml()).expect("valid config");
    let settings = config.settings();
    assert_eq!(settings.connect_timeout, Duration::from_millis(250));
    assert_eq!(settings.reconnect_interval, Duration::from_millis(500));
    assert_eq!(settings.max_frame_bytes, 4096);
}

#[test]
fn empty_channel_name_is_rejected() {
    let err = ExchangeConfig::from_toml_str(
        r#"
channel_name = "  "
role = "listener"
"#,
    )
    .expect_err("blank channel must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("channel_name")));
}

#[test]
fn unset_role_is_rejected() {
    let err = ExchangeConfig::from_toml_str(
        r#"
channel_name = "Channel"
role = "unset"
"#,
    )
    .expect_err("unset role must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("role")));
}

#[test]
fn unknown_role_is_a_parse_error() {
    let err = ExchangeConfig::from_toml_str(
        r#"
channel_name = "Channel"
role = "server"
"#,
    )
    .expect_err("unknown role must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn zero_timings_are_rejected() {
    for key in ["connect_timeout_ms", "reconnect_interval_ms", "max_frame_bytes"] {
        let raw = format!("channel_name = \"Channel\"\nrole = \"listener\"\n{key} = 0\n");
        let err = ExchangeConfig::from_toml_str(&raw).expect_err("zero must fail");
        assert!(
            matches!(err, AppError::Config(ref msg) if msg.contains(key)),
            "unexpected error for {key}: {err}"
        );
    }
}

#[test]
fn new_validates_inputs() {
    assert!(ExchangeConfig::new("Channel", ExchangeRole::Listener).is_ok());
    assert!(ExchangeConfig::new("", ExchangeRole::Listener).is_err());
    assert!(ExchangeConfig::new("Channel", ExchangeRole::Unset).is_err());
}

#[test]
fn channel_name_rejects_separators_and_nul() {
    assert!(validate_channel_name("Channel").is_ok());
    assert!(validate_channel_name("my-channel.1").is_ok());
    assert!(validate_channel_name("a/b").is_err());
    assert!(validate_channel_name("a\\b").is_err());
    assert!(validate_channel_name("a\0b").is_err());
    assert!(validate_channel_name("").is_err());
}

#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(sample_toml().as_bytes()).expect("write config");

    let config = ExchangeConfig::load_from_path(file.path()).expect("valid config");
    assert_eq!(config.channel_name, "Channel");
}

#[test]
fn load_from_missing_path_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = ExchangeConfig::load_from_path(dir.path().join("missing.toml"))
        .expect_err("missing file must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}
