//! Payload codec for exchangeable objects.
//!
//! [`JsonCodec`] writes one compact JSON document per snapshot:
//!
//! ```json
//! {"object":"object1","fields":{"TestDataString":"hello","TestDataInt":7}}
//! ```
//!
//! The document is self-describing: fields are keyed by name, so declaration
//! order does not matter. Compact `serde_json` output never contains a raw
//! newline, which lets the transport frame payloads by line.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::exchange::object::ExchangeObject;
use crate::{AppError, Result};

/// Encodes an object's declared fields to bytes and back.
pub trait Codec<T>: Send + Sync + 'static {
    /// Serialize the full current state of `object`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Codec` if serialization fails.
    fn encode(&self, object: &T) -> Result<Vec<u8>>;

    /// Decode `payload` into a transient object shaped like `shape`.
    ///
    /// Every declared field of the returned object comes from the payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Codec` for malformed payloads and `AppError::Sync`
    /// when the payload does not match the shape.
    fn decode(&self, payload: &[u8], shape: &T) -> Result<T>;
}

/// Wire envelope carrying one object snapshot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    /// Object name, used to reject payloads meant for another object.
    object: String,
    /// Field values keyed by declared field name.
    fields: Map<String, Value>,
}

/// JSON codec over the declared field list.
#[derive(Debug, Copy, Clone, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a JSON codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<T: ExchangeObject> Codec<T> for JsonCodec {
    fn encode(&self, object: &T) -> Result<Vec<u8>> {
        let fields = T::fields()
            .iter()
            .map(|field| (field.name.to_owned(), (field.get)(object)))
            .collect();
        let envelope = Envelope {
            object: object.object_name().to_owned(),
            fields,
        };
        serde_json::to_vec(&envelope)
            .map_err(|err| AppError::Codec(format!("failed to encode snapshot: {err}")))
    }

    fn decode(&self, payload: &[u8], shape: &T) -> Result<T> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|err| AppError::Codec(format!("malformed payload: {err}")))?;

        if envelope.object != shape.object_name() {
            return Err(AppError::Sync(format!(
                "payload for object '{}' does not match '{}'",
                envelope.object,
                shape.object_name()
            )));
        }

        let mut values = envelope.fields;
        let mut transient = shape.clone();
        for field in T::fields() {
            let value = values
                .remove(field.name)
                .ok_or_else(|| AppError::Sync(format!("missing field '{}'", field.name)))?;
            (field.set)(&mut transient, value)?;
        }

        if !values.is_empty() {
            let mut extra: Vec<&str> = values.keys().map(String::as_str).collect();
            extra.sort_unstable();
            return Err(AppError::Sync(format!(
                "undeclared field(s): {}",
                extra.join(", ")
            )));
        }

        Ok(transient)
    }
}
