//! `did:key` identifiers for P-256 public keys.
//!
//! A `did:key` is the multibase (base58btc, prefix `z`) rendering of the
//! multicodec-tagged public key:
//!
//! ```text
//! did:key:z || base58btc(0x80 0x24 || SEC1 point)
//! ```
//!
//! `0x80 0x24` is the unsigned varint of `0x1200` (`p256-pub`). The point is
//! written uncompressed (65 bytes) unless [`PointEncoding::Compressed`] is
//! requested; atproto verifiers expect the compressed (33 byte) form.
//!
//! # Example
//!
//! ```
//! use yubikey_plc_signer_core::{DidKey, PointEncoding, PublicKey};
//!
//! let point = hex::decode(
//!     "046b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296\
//!      4fe342e2fe1a7f9b8ee7eb4a7c0f9e162bce33576b315ececbb6406837bf51f5",
//! )
//! .unwrap();
//! let key = PublicKey::p256(point);
//!
//! let did = DidKey::derive(&key, PointEncoding::Compressed).unwrap();
//! assert_eq!(
//!     did.to_string(),
//!     "did:key:zDnaepsL7AXenJkVYdkh5KuKsSU7Ykh7kyXaLLU7auN9FWSiZ"
//! );
//! ```

use core::fmt;
use core::str::FromStr;

use base58::{FromBase58, ToBase58};
use p256::ecdsa::VerifyingKey;

use crate::error::{Error, Result};

/// Varint of the `p256-pub` multicodec (`0x1200`).
const P256_MULTICODEC: [u8; 2] = [0x80, 0x24];

/// Method prefix including the base58btc multibase code.
const DID_KEY_PREFIX: &str = "did:key:z";

/// Elliptic curve a public key lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Curve {
    /// NIST P-256 (secp256r1, prime256v1).
    P256,
    /// NIST P-384 (secp384r1).
    P384,
    /// Any other curve, identified by its dotted OID.
    Other(String),
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P256 => f.write_str("P-256"),
            Self::P384 => f.write_str("P-384"),
            Self::Other(oid) => write!(f, "curve {oid}"),
        }
    }
}

/// A public key as read from the token: a curve tag and SEC1 point bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    curve: Curve,
    point: Vec<u8>,
}

impl PublicKey {
    /// Creates a public key from its curve and SEC1 encoded point.
    #[must_use]
    pub const fn new(curve: Curve, point: Vec<u8>) -> Self {
        Self { curve, point }
    }

    /// Creates a P-256 public key from a SEC1 encoded point.
    #[must_use]
    pub const fn p256(point: Vec<u8>) -> Self {
        Self::new(Curve::P256, point)
    }

    /// Returns the curve of this key.
    #[must_use]
    pub const fn curve(&self) -> &Curve {
        &self.curve
    }

    /// Returns the SEC1 point bytes as read from the token.
    #[must_use]
    pub fn point(&self) -> &[u8] {
        &self.point
    }

    /// Decodes the point into a P-256 verifying key.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedKeyMaterial`] if the key is not on P-256.
    /// - [`Error::PointEncoding`] if the bytes are not a valid curve point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        if self.curve != Curve::P256 {
            return Err(Error::UnsupportedKeyMaterial(format!(
                "{} key, only P-256 is supported",
                self.curve
            )));
        }
        VerifyingKey::from_sec1_bytes(&self.point).map_err(|_| {
            Error::PointEncoding(format!(
                "{} bytes are not a valid P-256 point",
                self.point.len()
            ))
        })
    }
}

impl From<&VerifyingKey> for PublicKey {
    fn from(key: &VerifyingKey) -> Self {
        Self::p256(key.to_encoded_point(false).as_bytes().to_vec())
    }
}

/// How the curve point is written inside the identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PointEncoding {
    /// `0x04 || X || Y`, 65 bytes.
    #[default]
    Uncompressed,
    /// `0x02`/`0x03 || X`, 33 bytes.
    Compressed,
}

impl PointEncoding {
    const fn is_compressed(self) -> bool {
        matches!(self, Self::Compressed)
    }
}

impl FromStr for PointEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uncompressed" => Ok(Self::Uncompressed),
            "compressed" => Ok(Self::Compressed),
            other => Err(Error::InvalidConfig(format!(
                "unknown point encoding {other:?}, expected \"uncompressed\" or \"compressed\""
            ))),
        }
    }
}

/// A `did:key` identifier for a P-256 key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DidKey {
    key: VerifyingKey,
    encoding: PointEncoding,
}

impl DidKey {
    /// Derives the identifier of a public key.
    ///
    /// The result depends only on the key and the encoding.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedKeyMaterial`] if the key is not on P-256.
    /// - [`Error::PointEncoding`] if the point cannot be decoded.
    pub fn derive(public_key: &PublicKey, encoding: PointEncoding) -> Result<Self> {
        Ok(Self::from_verifying_key(public_key.verifying_key()?, encoding))
    }

    /// Wraps an already decoded verifying key.
    #[must_use]
    pub const fn from_verifying_key(key: VerifyingKey, encoding: PointEncoding) -> Self {
        Self { key, encoding }
    }

    /// Returns the verifying key behind the identifier.
    #[must_use]
    pub const fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Returns the point encoding used when rendering.
    #[must_use]
    pub const fn encoding(&self) -> PointEncoding {
        self.encoding
    }

    /// Returns the multicodec-tagged key bytes.
    #[must_use]
    pub fn multicodec_bytes(&self) -> Vec<u8> {
        let point = self.key.to_encoded_point(self.encoding.is_compressed());
        let mut bytes = Vec::with_capacity(P256_MULTICODEC.len() + point.len());
        bytes.extend_from_slice(&P256_MULTICODEC);
        bytes.extend_from_slice(point.as_bytes());
        bytes
    }
}

impl fmt::Display for DidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DID_KEY_PREFIX}{}", self.multicodec_bytes().to_base58())
    }
}

impl FromStr for DidKey {
    type Err = Error;

    /// Parses a `did:key` with either point encoding.
    fn from_str(s: &str) -> Result<Self> {
        let encoded = s
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| Error::MalformedInput(format!("{s:?} is not a base58btc did:key")))?;
        let bytes = encoded
            .from_base58()
            .map_err(|e| Error::MalformedInput(format!("invalid base58 in did:key: {e:?}")))?;

        let point = bytes
            .strip_prefix(&P256_MULTICODEC[..])
            .ok_or_else(|| Error::UnsupportedKeyMaterial("did:key is not a P-256 key".into()))?;
        let encoding = match point.len() {
            33 => PointEncoding::Compressed,
            65 => PointEncoding::Uncompressed,
            n => {
                return Err(Error::PointEncoding(format!(
                    "P-256 point must be 33 or 65 bytes, got {n}"
                )));
            }
        };

        let key = PublicKey::p256(point.to_vec()).verifying_key()?;
        Ok(Self::from_verifying_key(key, encoding))
    }
}
