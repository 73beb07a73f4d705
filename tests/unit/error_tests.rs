//! Unit tests for `AppError` display format and conversions.

use object_exchange::AppError;

#[test]
fn display_prefixes_identify_the_kind() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Transport("x".into()), "transport: x"),
        (AppError::Codec("x".into()), "codec: x"),
        (AppError::Sync("x".into()), "sync: x"),
        (AppError::NotConnected("x".into()), "not connected: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Transport("connect to 'Channel' refused".into());
    let s = err.to_string();
    assert!(
        !s.ends_with('.'),
        "error message must not end with a period: {s}"
    );
}

#[test]
fn toml_error_converts_to_config() {
    let parse: Result<toml::Value, _> = toml::from_str("channel_name = ");
    let err = AppError::from(parse.expect_err("invalid toml"));
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn json_error_converts_to_codec() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
    let err = AppError::from(parse.expect_err("invalid json"));
    assert!(matches!(err, AppError::Codec(_)));
}

#[test]
fn io_error_converts_to_io() {
    let err = AppError::from(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "pipe closed",
    ));
    assert_eq!(err.to_string(), "io: pipe closed");
}
