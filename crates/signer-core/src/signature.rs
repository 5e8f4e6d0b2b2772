//! Compact P-256 ECDSA signatures.
//!
//! The `did:plc` protocol carries signatures in the fixed-width compact form:
//!
//! - `r`: 32 bytes, big-endian, left zero-padded
//! - `s`: 32 bytes, big-endian, left zero-padded
//!
//! Inside an operation document the 64 bytes are rendered as unpadded
//! URL-safe base64.
//!
//! # Example
//!
//! ```
//! use yubikey_plc_signer_core::CompactSignature;
//!
//! let sig = CompactSignature::new([0u8; 32], [1u8; 32]);
//! let text = sig.to_base64url();
//! assert_eq!(text.len(), 86);
//! assert_eq!(CompactSignature::from_base64url(&text).unwrap(), sig);
//! ```

use core::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::crypto;
use crate::error::{Error, Result};

/// A 64-byte `r || s` ECDSA signature over P-256.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactSignature {
    /// The R component (32 bytes).
    r: [u8; 32],

    /// The S component (32 bytes).
    s: [u8; 32],
}

impl CompactSignature {
    /// The length of a serialized signature in bytes.
    pub const BYTE_LEN: usize = 64;

    /// Creates a new signature from raw components.
    #[must_use]
    pub const fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Self { r, s }
    }

    /// Converts a DER-encoded signature, as returned by the YubiKey, to the
    /// compact form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSignature`] if the DER is not exactly two
    /// positive integers of at most 32 bytes each.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (r, s) = crypto::parse_der_signature(der)?;
        Ok(Self::new(r, s))
    }

    /// Encodes the signature as minimal DER.
    #[must_use]
    pub fn to_der(&self) -> Vec<u8> {
        crypto::encode_der_signature(&self.r, &self.s)
    }

    /// Creates a signature from a 64-byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSignature`] if the slice is not 64 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return Err(Error::MalformedSignature(format!(
                "expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Self::new(r, s))
    }

    /// Serializes the signature to its 64-byte form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    /// Returns the R component of the signature.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component of the signature.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Returns the signature with `s` folded into the lower half of the
    /// curve order, and whether it had to be flipped.
    ///
    /// Verifiers that enforce low-S (atproto does) reject the other half.
    #[must_use]
    pub fn normalize_s(self) -> (Self, bool) {
        let (r, s, flipped) = crypto::normalize_s(self.r, self.s);
        (Self::new(r, s), flipped)
    }

    /// Checks whether `s` is already in the lower half of the curve order.
    #[must_use]
    pub fn is_low_s(&self) -> bool {
        !crypto::normalize_s(self.r, self.s).2
    }

    /// Encodes the signature as unpadded URL-safe base64.
    #[must_use]
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    /// Parses an unpadded URL-safe base64 signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSignature`] if the text is not valid base64
    /// or does not decode to 64 bytes.
    pub fn from_base64url(text: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| Error::MalformedSignature(format!("invalid base64url: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactSignature")
            .field("r", &hex::encode(self.r))
            .field("s", &hex::encode(self.s))
            .finish()
    }
}

impl fmt::Display for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

impl Serialize for CompactSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for CompactSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_base64url(&text).map_err(de::Error::custom)
    }
}
