//! The exchangeable object contract.
//!
//! An exchangeable object declares its shape statically: an ordered list of
//! named fields, each with a getter and a setter working on
//! [`serde_json::Value`]. Both peers must declare the same names and value
//! types; the list order is irrelevant because fields are matched by name.
//!
//! ```rust,ignore
//! impl ExchangeObject for Counter {
//!     fn object_name(&self) -> &str { "counter" }
//!     fn fields() -> &'static [Field<Self>] { COUNTER_FIELDS }
//! }
//! ```

use std::fmt::{Debug, Formatter};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{AppError, Result};

/// Reads one field out of an object.
pub type Getter<T> = fn(&T) -> Value;

/// Writes one field into an object. Does not raise change notifications.
pub type Setter<T> = fn(&mut T, Value) -> Result<()>;

/// One declared field of an exchangeable object shape.
pub struct Field<T> {
    /// Field name used on the wire.
    pub name: &'static str,
    /// Accessor returning the current value.
    pub get: Getter<T>,
    /// Mutator applying a decoded value.
    pub set: Setter<T>,
}

impl<T> Field<T> {
    /// Declare a field.
    #[must_use]
    pub const fn new(name: &'static str, get: Getter<T>, set: Setter<T>) -> Self {
        Self { name, get, set }
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> Debug for Field<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// Data holder whose state is mirrored to the peer process.
///
/// `Clone` builds the transient instance an inbound payload is decoded into
/// before it is copied onto the live object.
pub trait ExchangeObject: Clone + Send + Sync + 'static {
    /// Name identifying this object on the channel.
    fn object_name(&self) -> &str;

    /// Ordered, static field list describing the object shape.
    fn fields() -> &'static [Field<Self>];
}

/// Names of every declared field of `T`, in declaration order.
#[must_use]
pub fn field_names<T: ExchangeObject>() -> Vec<&'static str> {
    T::fields().iter().map(|field| field.name).collect()
}

/// Look up a declared field by name.
#[must_use]
pub fn find_field<T: ExchangeObject>(name: &str) -> Option<&'static Field<T>> {
    T::fields().iter().find(|field| field.name == name)
}

/// Copy every declared field of `src` onto `dst`, by name.
///
/// # Errors
///
/// Returns `AppError::Sync` if a setter rejects the value produced by the
/// matching getter.
pub fn copy_fields<T: ExchangeObject>(src: &T, dst: &mut T) -> Result<()> {
    for field in T::fields() {
        (field.set)(dst, (field.get)(src))?;
    }
    Ok(())
}

/// Convert a raw field value into a concrete type for a setter.
///
/// # Errors
///
/// Returns `AppError::Sync` naming the field when the value has the wrong
/// type.
pub fn field_value<V: DeserializeOwned>(name: &str, value: Value) -> Result<V> {
    serde_json::from_value(value)
        .map_err(|err| AppError::Sync(format!("field '{name}' has unexpected type: {err}")))
}
