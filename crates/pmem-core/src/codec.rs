//! Value codec
//!
//! Values live in the cache as `serde_json::Value` and in the store's `value`
//! column as JSON text. Numbers, strings, booleans, null, arrays and objects
//! survive the round trip unchanged. Non-finite floats encode as null, and maps
//! with non-string keys cannot be encoded at all.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Convert a caller value into its cached form.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Convert a cached value back into the caller's type.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Encode a cached value for the store's text column.
pub fn encode(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a stored column back into its cached form.
pub fn decode(column: &str) -> Result<Value> {
    Ok(serde_json::from_str(column)?)
}
