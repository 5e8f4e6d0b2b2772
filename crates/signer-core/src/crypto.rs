//! Cryptographic utilities for secp256r1 (P-256) ECDSA.
//!
//! This module converts between the signature encodings involved in signing
//! a `did:plc` operation with a YubiKey:
//!
//! - DER to compact `r || s` conversion (and back)
//! - Signature normalization (low-S)
//! - Local verification of a compact signature
//!
//! # Signature Format
//!
//! YubiKey returns signatures in DER format:
//! ```text
//! 30 len 02 r_len r_bytes 02 s_len s_bytes
//! ```
//!
//! `did:plc` uses the compact format: `r || s` (64 bytes total).
//!
//! # Example
//!
//! ```
//! use yubikey_plc_signer_core::crypto::parse_der_signature;
//!
//! // Parse a DER-encoded signature
//! let der = vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
//! let (r, s) = parse_der_signature(&der).unwrap();
//! assert_eq!(r[31], 1);
//! assert_eq!(s[31], 2);
//! ```

use std::cmp::Ordering;

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::der::{DerReader, write_len};
use crate::error::{Error, Result};
use crate::signature::CompactSignature;

/// DER tags used by ECDSA signatures.
mod tag {
    pub(super) const INTEGER: u16 = 0x02;
    pub(super) const SEQUENCE: u16 = 0x30;
}

/// Width of one signature scalar in the compact form.
const SCALAR_LEN: usize = 32;

/// The order of the secp256r1 (P-256) curve divided by 2.
///
/// Used for signature normalization (low-S form).
const HALF_N: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0x80, 0x00, 0x00, 0x00, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xDE, 0x73, 0x7D, 0x56, 0xD3, 0x8B, 0xCF, 0x42, 0x79, 0xDC, 0xE5, 0x61, 0x7E, 0x31, 0x92, 0xA8,
];

/// The order of the secp256r1 (P-256) curve.
const N: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xBC, 0xE6, 0xFA, 0xAD, 0xA7, 0x17, 0x9E, 0x84, 0xF3, 0xB9, 0xCA, 0xC2, 0xFC, 0x63, 0x25, 0x51,
];

/// Computes the SHA-256 digest that the YubiKey signs.
#[must_use]
pub fn sha256(message: &[u8]) -> [u8; 32] {
    Sha256::digest(message).into()
}

/// Parses a DER-encoded ECDSA signature into raw `(r, s)` components.
///
/// Each integer is right-aligned into 32 bytes with zero padding. Nothing is
/// ever truncated: an integer that needs more than 32 bytes is an error.
///
/// # Errors
///
/// Returns [`Error::MalformedSignature`] if:
///
/// - the input is not a single `SEQUENCE` of exactly two `INTEGER`s
/// - either integer is empty, zero, negative or not minimally encoded
/// - either integer needs more than 32 bytes
///
/// # Example
///
/// ```
/// use yubikey_plc_signer_core::crypto::parse_der_signature;
///
/// // DER with a leading zero for the high bit
/// let der = vec![0x30, 0x08, 0x02, 0x02, 0x00, 0x80, 0x02, 0x02, 0x00, 0x90];
/// let (r, s) = parse_der_signature(&der).unwrap();
/// assert_eq!(r[31], 0x80);
/// assert_eq!(s[31], 0x90);
/// ```
pub fn parse_der_signature(der: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let malformed = |msg: &str| Error::MalformedSignature(msg.to_string());

    let mut outer = DerReader::new(der);
    let body = outer.read(tag::SEQUENCE).map_err(malformed)?;
    if !outer.is_empty() {
        return Err(malformed("trailing data after sequence"));
    }

    let mut inner = DerReader::new(body);
    let r = inner.read(tag::INTEGER).map_err(malformed)?;
    let s = inner.read(tag::INTEGER).map_err(malformed)?;
    if !inner.is_empty() {
        return Err(malformed("sequence holds more than two integers"));
    }

    Ok((to_fixed_bytes(r, "r")?, to_fixed_bytes(s, "s")?))
}

/// Converts DER integer content to a fixed 32-byte array.
fn to_fixed_bytes(content: &[u8], name: &str) -> Result<[u8; 32]> {
    let err = |msg: &str| Error::MalformedSignature(format!("{name}: {msg}"));

    let (&first, rest) = content.split_first().ok_or_else(|| err("empty integer"))?;
    if first & 0x80 != 0 {
        return Err(err("negative integer"));
    }

    // A single 0x00 is only allowed in front of a byte with the high bit set
    let magnitude = if first == 0x00 {
        match rest.first() {
            None => return Err(err("zero integer")),
            Some(next) if next & 0x80 == 0 => return Err(err("non-minimal integer")),
            Some(_) => rest,
        }
    } else {
        content
    };

    if magnitude.len() > SCALAR_LEN {
        return Err(err(&format!(
            "integer is {} bytes, at most {SCALAR_LEN} allowed",
            magnitude.len()
        )));
    }

    let mut result = [0u8; 32];
    result[SCALAR_LEN - magnitude.len()..].copy_from_slice(magnitude);
    Ok(result)
}

/// Encodes `(r, s)` as a minimal DER `SEQUENCE` of two `INTEGER`s.
///
/// This is the inverse of [`parse_der_signature`].
#[must_use]
pub fn encode_der_signature(r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 * (SCALAR_LEN + 3));
    push_integer(&mut body, r);
    push_integer(&mut body, s);

    let mut der = Vec::with_capacity(body.len() + 3);
    der.push(tag::SEQUENCE as u8);
    write_len(&mut der, body.len());
    der.extend_from_slice(&body);
    der
}

fn push_integer(out: &mut Vec<u8>, scalar: &[u8; 32]) {
    let start = scalar.iter().position(|&b| b != 0).unwrap_or(SCALAR_LEN - 1);
    let magnitude = &scalar[start..];
    let pad = magnitude[0] & 0x80 != 0;

    out.push(tag::INTEGER as u8);
    write_len(out, magnitude.len() + usize::from(pad));
    if pad {
        out.push(0x00);
    }
    out.extend_from_slice(magnitude);
}

/// Normalizes a signature to low-S form.
///
/// # Returns
///
/// A tuple `(r, s, flipped)` where:
///
/// - `r` is unchanged
/// - `s` is normalized to low-S form
/// - `flipped` indicates if S was negated
///
/// # Example
///
/// ```
/// use yubikey_plc_signer_core::crypto::normalize_s;
///
/// let r = [0u8; 32];
/// let s = [0x80u8; 32]; // above n/2
/// let (_, _, flipped) = normalize_s(r, s);
/// assert!(flipped);
/// ```
#[must_use]
pub fn normalize_s(r: [u8; 32], s: [u8; 32]) -> ([u8; 32], [u8; 32], bool) {
    if compare_bytes(&s, &HALF_N) == Ordering::Greater {
        (r, subtract(&N, &s), true)
    } else {
        (r, s, false)
    }
}

/// Compares two 32-byte arrays as big-endian integers.
fn compare_bytes(a: &[u8; 32], b: &[u8; 32]) -> Ordering {
    a.iter().cmp(b.iter())
}

/// Computes `a - b` for 32-byte big-endian integers with `a >= b`.
fn subtract(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow = 0i16;

    for i in (0..32).rev() {
        let diff = i16::from(a[i]) - i16::from(b[i]) - borrow;
        if diff < 0 {
            result[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            result[i] = diff as u8;
            borrow = 0;
        }
    }

    result
}

/// Verifies a compact signature over a SHA-256 digest.
///
/// # Errors
///
/// Returns [`Error::SignatureVerification`] if the scalars are out of range or
/// the signature does not match the key.
pub fn verify_compact(
    digest: &[u8; 32],
    signature: &CompactSignature,
    public_key: &VerifyingKey,
) -> Result<()> {
    let sig = P256Signature::from_slice(&signature.to_bytes())
        .map_err(|_| Error::SignatureVerification)?;
    public_key
        .verify_prehash(digest, &sig)
        .map_err(|_| Error::SignatureVerification)
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use proptest::prelude::*;

    use super::*;

    /// RFC 6979 A.2.5 private key.
    const RFC6979_KEY: &str = "c9afa9d845ba75166b5c215767b1d6934e50c3db36e89b127b8a622b120f6721";

    /// RFC 6979 A.2.5 SHA-256 signature over "sample"; both scalars need a
    /// DER sign byte.
    const SAMPLE_R: &str = "efd48b2aacb6a8fd1140dd9cd45e81d69d2c877b56aaf991c34d0ea84eaf3716";
    const SAMPLE_S: &str = "f7cb1c942d657c41d436c7a1b6e29f65f3e900dbb9aff4064dc4ab2f843acda8";

    fn scalar(hex_str: &str) -> [u8; 32] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    fn sample_der() -> Vec<u8> {
        let mut der = vec![0x30, 0x46, 0x02, 0x21, 0x00];
        der.extend_from_slice(&scalar(SAMPLE_R));
        der.extend_from_slice(&[0x02, 0x21, 0x00]);
        der.extend_from_slice(&scalar(SAMPLE_S));
        der
    }

    #[test]
    fn parse_der_signature_simple() {
        let der = vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
        let (r, s) = parse_der_signature(&der).unwrap();

        assert_eq!(r[31], 1);
        assert_eq!(s[31], 2);
        assert_eq!(r[0..31], [0u8; 31]);
    }

    #[test]
    fn parse_der_signature_known_vector() {
        let (r, s) = parse_der_signature(&sample_der()).unwrap();
        assert_eq!(r, scalar(SAMPLE_R));
        assert_eq!(s, scalar(SAMPLE_S));
    }

    #[test]
    fn parse_der_signature_pads_short_integers() {
        // r is 31 bytes: the device dropped a leading zero byte
        let mut der = vec![0x30, 0x24, 0x02, 0x1F];
        der.extend_from_slice(&[0x42; 31]);
        der.extend_from_slice(&[0x02, 0x01, 0x07]);
        let (r, s) = parse_der_signature(&der).unwrap();

        assert_eq!(r[0], 0x00);
        assert_eq!(r[1..], [0x42; 31]);
        assert_eq!(s[31], 0x07);
    }

    #[test]
    fn parse_der_signature_rejects_oversize_integer() {
        // 33 magnitude bytes, high bit clear, so no sign byte to strip
        let mut der = vec![0x30, 0x26, 0x02, 0x21];
        der.extend_from_slice(&[0x01; 33]);
        der.extend_from_slice(&[0x02, 0x01, 0x01]);
        let err = parse_der_signature(&der).unwrap_err();

        assert!(matches!(err, Error::MalformedSignature(_)));
        assert!(err.to_string().contains("33 bytes"));
    }

    #[test]
    fn parse_der_signature_rejects_bad_structure() {
        let cases: [&[u8]; 8] = [
            // wrong sequence tag
            &[0x31, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02],
            // too short
            &[0x30, 0x04],
            // only one integer
            &[0x30, 0x03, 0x02, 0x01, 0x01],
            // three integers
            &[0x30, 0x09, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02, 0x02, 0x01, 0x03],
            // trailing bytes after the sequence
            &[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02, 0x00],
            // empty integer
            &[0x30, 0x05, 0x02, 0x00, 0x02, 0x01, 0x02],
            // negative integer
            &[0x30, 0x06, 0x02, 0x01, 0x81, 0x02, 0x01, 0x02],
            // non-minimal integer
            &[0x30, 0x07, 0x02, 0x02, 0x00, 0x01, 0x02, 0x01, 0x02],
        ];
        for der in cases {
            assert!(
                matches!(parse_der_signature(der), Err(Error::MalformedSignature(_))),
                "accepted {}",
                hex::encode(der)
            );
        }
    }

    #[test]
    fn parse_der_signature_rejects_zero() {
        let der = [0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x01];
        assert!(parse_der_signature(&der).is_err());
    }

    #[test]
    fn encode_der_signature_known_vector() {
        let der = encode_der_signature(&scalar(SAMPLE_R), &scalar(SAMPLE_S));
        assert_eq!(der, sample_der());
    }

    #[test]
    fn matches_p256_der_encoding() {
        let key = SigningKey::from_slice(&scalar(RFC6979_KEY)).unwrap();
        let digest = sha256(b"sample");
        let sig: P256Signature = key.sign_prehash(&digest).unwrap();
        let der = sig.to_der();

        let (r, s) = parse_der_signature(der.as_bytes()).unwrap();
        assert_eq!(r, scalar(SAMPLE_R));
        assert_eq!(s, scalar(SAMPLE_S));
        assert_eq!(encode_der_signature(&r, &s), der.as_bytes());
    }

    #[test]
    fn normalize_s_low() {
        let r = [0u8; 32];
        let mut s = [0u8; 32];
        s[31] = 1;

        let (r_out, s_out, flipped) = normalize_s(r, s);

        assert_eq!(r_out, r);
        assert_eq!(s_out, s);
        assert!(!flipped);
    }

    #[test]
    fn normalize_s_high() {
        // HALF_N + 1 is the smallest high S
        let r = [0u8; 32];
        let mut s = HALF_N;
        s[31] += 1;

        let (r_out, s_out, flipped) = normalize_s(r, s);

        assert_eq!(r_out, r);
        assert!(flipped);
        assert_eq!(s_out, HALF_N);
    }

    #[test]
    fn normalized_signature_still_verifies() {
        let key = SigningKey::from_slice(&scalar(RFC6979_KEY)).unwrap();
        let digest = sha256(b"sample");
        // the RFC 6979 sample signature has a high S
        let sig = CompactSignature::new(scalar(SAMPLE_R), scalar(SAMPLE_S));
        let (normalized, flipped) = sig.normalize_s();

        assert!(flipped);
        verify_compact(&digest, &sig, key.verifying_key()).unwrap();
        verify_compact(&digest, &normalized, key.verifying_key()).unwrap();
    }

    #[test]
    fn verify_compact_rejects_other_digest() {
        let key = SigningKey::from_slice(&scalar(RFC6979_KEY)).unwrap();
        let sig = CompactSignature::new(scalar(SAMPLE_R), scalar(SAMPLE_S));

        let err = verify_compact(&sha256(b"other"), &sig, key.verifying_key()).unwrap_err();
        assert!(matches!(err, Error::SignatureVerification));
    }

    #[test]
    fn compare_bytes_works() {
        let a = [0u8; 32];
        let mut c = [0u8; 32];
        c[0] = 1;
        assert_eq!(compare_bytes(&a, &a), Ordering::Equal);
        assert_eq!(compare_bytes(&c, &a), Ordering::Greater);
        assert_eq!(compare_bytes(&a, &c), Ordering::Less);
    }

    #[test]
    fn subtract_borrows_across_bytes() {
        let mut a = [0u8; 32];
        a[30] = 1;
        let mut b = [0u8; 32];
        b[31] = 1;

        let mut expected = [0u8; 32];
        expected[31] = 0xFF;
        assert_eq!(subtract(&a, &b), expected);
    }

    fn nonzero_scalar() -> impl Strategy<Value = [u8; 32]> {
        any::<[u8; 32]>().prop_filter("non-zero", |s| s.iter().any(|&b| b != 0))
    }

    proptest! {
        #[test]
        fn der_round_trip_preserves_scalars(r in nonzero_scalar(), s in nonzero_scalar()) {
            let der = encode_der_signature(&r, &s);
            let compact = CompactSignature::from_der(&der).unwrap();

            prop_assert_eq!(compact.to_bytes().len(), CompactSignature::BYTE_LEN);
            prop_assert_eq!(compact.r(), &r);
            prop_assert_eq!(compact.s(), &s);
        }

        #[test]
        fn oversize_integers_are_never_truncated(
            extra in prop::collection::vec(any::<u8>(), 33..40),
        ) {
            let mut magnitude = extra;
            magnitude[0] = 0x01;
            let mut body = vec![0x02];
            write_len(&mut body, magnitude.len());
            body.extend_from_slice(&magnitude);
            body.extend_from_slice(&[0x02, 0x01, 0x01]);
            let mut der = vec![0x30];
            write_len(&mut der, body.len());
            der.extend_from_slice(&body);

            prop_assert!(matches!(
                parse_der_signature(&der),
                Err(Error::MalformedSignature(_))
            ));
        }
    }
}
