//! Reference exchangeable object used by the demo binary and tests.

use serde_json::Value;

use crate::exchange::object::{field_value, ExchangeObject, Field};
use crate::Result;

/// Default object name of the demo record.
pub const DEMO_OBJECT_NAME: &str = "object1";

/// Demo data container with one text and one integer field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoRecord {
    /// Name identifying the object on the channel.
    pub object_name: String,
    /// Example string to exchange.
    pub test_data_string: String,
    /// Example integer to exchange.
    pub test_data_int: i64,
}

impl DemoRecord {
    /// Create a record with the given object name and empty fields.
    #[must_use]
    pub fn named(object_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            test_data_string: String::new(),
            test_data_int: 0,
        }
    }
}

impl Default for DemoRecord {
    fn default() -> Self {
        Self::named(DEMO_OBJECT_NAME)
    }
}

fn get_string(record: &DemoRecord) -> Value {
    Value::String(record.test_data_string.clone())
}

fn set_string(record: &mut DemoRecord, value: Value) -> Result<()> {
    record.test_data_string = field_value("TestDataString", value)?;
    Ok(())
}

fn get_int(record: &DemoRecord) -> Value {
    Value::from(record.test_data_int)
}

fn set_int(record: &mut DemoRecord, value: Value) -> Result<()> {
    record.test_data_int = field_value("TestDataInt", value)?;
    Ok(())
}

const DEMO_FIELDS: &[Field<DemoRecord>] = &[
    Field::new("TestDataString", get_string, set_string),
    Field::new("TestDataInt", get_int, set_int),
];

impl ExchangeObject for DemoRecord {
    fn object_name(&self) -> &str {
        &self.object_name
    }

    fn fields() -> &'static [Field<Self>] {
        DEMO_FIELDS
    }
}
