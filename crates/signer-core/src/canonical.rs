//! Canonical DAG-CBOR encoding of operation documents.
//!
//! The bytes produced here are what gets hashed and signed. Encoding goes
//! through `serde_ipld_dagcbor`, which orders map keys by encoded length first,
//! then bytewise, uses the shortest integer heads, 64-bit floats and definite
//! lengths.
//!
//! The top-level `sig` field is skipped while encoding, so the caller's
//! document is never modified.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use yubikey_plc_signer_core::canonical::encode_value;
//!
//! let bytes = encode_value(&json!({"foo": "bar"})).unwrap();
//! assert_eq!(bytes, [0xa1, 0x63, b'f', b'o', b'o', 0x63, b'b', b'a', b'r']);
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Name of the document field that carries the signature.
pub const SIGNATURE_FIELD: &str = "sig";

/// Encodes a document without its top-level `sig` field.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if a value cannot be represented in DAG-CBOR.
pub fn encode(document: &Map<String, Value>) -> Result<Vec<u8>> {
    let unsigned: BTreeMap<&str, &Value> = document
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE_FIELD)
        .map(|(key, value)| (key.as_str(), value))
        .collect();
    dag_cbor(&unsigned)
}

/// Encodes any JSON value as-is, without stripping anything.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if a value cannot be represented in DAG-CBOR.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    dag_cbor(value)
}

/// Converts a serializable document to its unsigned canonical bytes.
///
/// The value must serialize to a JSON object with string keys.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the value has non-string map keys, is not an
/// object, or holds values outside the JSON data model.
pub fn to_canonical<T: Serialize + ?Sized>(document: &T) -> Result<Vec<u8>> {
    match serde_json::to_value(document) {
        Ok(Value::Object(map)) => encode(&map),
        Ok(other) => Err(Error::Encoding(format!(
            "document must be a map, got {}",
            kind(&other)
        ))),
        Err(e) => Err(Error::Encoding(e.to_string())),
    }
}

fn dag_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| Error::Encoding(e.to_string()))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}
