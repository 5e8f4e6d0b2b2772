//! `did:plc` operation documents.
//!
//! An [`Operation`] is the JSON object read from stdin. It is never
//! interpreted beyond the top-level `sig` field: every other key is carried
//! through to the output unchanged.

use std::io::Read;

use serde_json::{Map, Value};

use crate::canonical::{self, SIGNATURE_FIELD};
use crate::crypto;
use crate::error::{Error, Result};
use crate::signature::CompactSignature;

/// A JSON operation document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Operation {
    fields: Map<String, Value>,
}

impl Operation {
    /// Wraps an already parsed JSON object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parses an operation from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the text is not valid JSON or the
    /// top-level value is not an object.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::try_from(serde_json::from_str::<Value>(text)?)
    }

    /// Reads and parses an operation from a reader (normally stdin).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if reading fails and [`Error::MalformedInput`]
    /// if the content is not a JSON object.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::try_from(serde_json::from_slice::<Value>(&bytes)?)
    }

    /// Returns the document fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns the current `sig` value, if any.
    #[must_use]
    pub fn signature(&self) -> Option<&Value> {
        self.fields.get(SIGNATURE_FIELD)
    }

    /// Returns the canonical DAG-CBOR bytes of the document without `sig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if a value cannot be canonically encoded.
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        canonical::encode(&self.fields)
    }

    /// Returns the SHA-256 digest of [`Self::unsigned_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if a value cannot be canonically encoded.
    pub fn digest(&self) -> Result<[u8; 32]> {
        Ok(crypto::sha256(&self.unsigned_bytes()?))
    }

    /// Replaces any existing `sig` with `signature`.
    pub fn set_signature(&mut self, signature: &CompactSignature) {
        self.fields.insert(
            SIGNATURE_FIELD.to_string(),
            Value::String(signature.to_base64url()),
        );
    }

    /// Renders the document with two-space indentation and a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.fields)?;
        text.push('\n');
        Ok(text)
    }

    /// Consumes the operation and returns its fields.
    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl TryFrom<Value> for Operation {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(Error::MalformedInput(format!(
                "expected a JSON object, got {}",
                kind(&other)
            ))),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
