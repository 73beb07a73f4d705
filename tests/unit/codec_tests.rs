//! Unit tests for `JsonCodec` payload encoding and validation.

use serde_json::json;

use object_exchange::exchange::codec::{Codec, JsonCodec};
use object_exchange::models::demo::DemoRecord;
use object_exchange::AppError;

fn record(text: &str, int: i64) -> DemoRecord {
    DemoRecord {
        test_data_string: text.into(),
        test_data_int: int,
        ..DemoRecord::default()
    }
}

fn decode(payload: &serde_json::Value) -> object_exchange::Result<DemoRecord> {
    let bytes = serde_json::to_vec(payload).expect("serialize test payload");
    JsonCodec::new().decode(&bytes, &DemoRecord::default())
}

// ── Encoding ─────────────────────────────────────────────

#[test]
fn encode_writes_name_and_every_field() {
    let bytes = JsonCodec::new()
        .encode(&record("hello", 7))
        .expect("encode succeeds");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("valid json");
    assert_eq!(
        value,
        json!({
            "object": "object1",
            "fields": { "TestDataString": "hello", "TestDataInt": 7 }
        })
    );
}

#[test]
fn encoded_payload_is_a_single_line() {
    let bytes = JsonCodec::new()
        .encode(&record("line one\nline two", 1))
        .expect("encode succeeds");
    assert!(!bytes.contains(&b'\n'), "escaped newline expected");
}

#[test]
fn decode_restores_encoded_state() {
    let sent = record("hello", -12);
    let bytes = JsonCodec::new().encode(&sent).expect("encode succeeds");
    let decoded = JsonCodec::new()
        .decode(&bytes, &DemoRecord::default())
        .expect("decode succeeds");
    assert_eq!(decoded, sent);
}

#[test]
fn decode_ignores_field_order() {
    let decoded = decode(&json!({
        "fields": { "TestDataInt": 3, "TestDataString": "x" },
        "object": "object1"
    }))
    .expect("decode succeeds");
    assert_eq!(decoded, record("x", 3));
}

#[test]
fn decode_does_not_touch_the_shape() {
    let shape = record("live", 1);
    let bytes = serde_json::to_vec(&json!({
        "object": "object1",
        "fields": { "TestDataString": "remote", "TestDataInt": 2 }
    }))
    .expect("serialize");
    let decoded = JsonCodec::new().decode(&bytes, &shape).expect("decode");
    assert_eq!(decoded.test_data_string, "remote");
    assert_eq!(shape.test_data_string, "live");
}

// ── Rejections ───────────────────────────────────────────

#[test]
fn malformed_payload_is_codec_error() {
    let err = JsonCodec::new()
        .decode(b"{not json", &DemoRecord::default())
        .expect_err("malformed");
    assert!(
        matches!(err, AppError::Codec(ref msg) if msg.starts_with("malformed payload")),
        "unexpected error: {err}"
    );
}

#[test]
fn unknown_envelope_key_is_codec_error() {
    let err = decode(&json!({
        "object": "object1",
        "fields": { "TestDataString": "x", "TestDataInt": 1 },
        "extra": true
    }))
    .expect_err("unknown envelope key");
    assert!(matches!(err, AppError::Codec(_)));
}

#[test]
fn other_object_name_is_rejected() {
    let err = decode(&json!({
        "object": "object2",
        "fields": { "TestDataString": "x", "TestDataInt": 1 }
    }))
    .expect_err("name mismatch");
    assert!(
        matches!(err, AppError::Sync(ref msg) if msg.contains("object2")),
        "unexpected error: {err}"
    );
}

#[test]
fn missing_field_is_rejected() {
    let err = decode(&json!({
        "object": "object1",
        "fields": { "TestDataString": "x" }
    }))
    .expect_err("missing field");
    assert!(
        matches!(err, AppError::Sync(ref msg) if msg == "missing field 'TestDataInt'"),
        "unexpected error: {err}"
    );
}

#[test]
fn undeclared_fields_are_listed_sorted() {
    let err = decode(&json!({
        "object": "object1",
        "fields": {
            "TestDataString": "x",
            "TestDataInt": 1,
            "Zeta": 0,
            "Alpha": 0
        }
    }))
    .expect_err("extra fields");
    assert!(
        matches!(err, AppError::Sync(ref msg) if msg == "undeclared field(s): Alpha, Zeta"),
        "unexpected error: {err}"
    );
}

#[test]
fn wrong_field_type_is_rejected() {
    let err = decode(&json!({
        "object": "object1",
        "fields": { "TestDataString": 5, "TestDataInt": 1 }
    }))
    .expect_err("type mismatch");
    assert!(matches!(err, AppError::Sync(ref msg) if msg.contains("TestDataString")));
}
