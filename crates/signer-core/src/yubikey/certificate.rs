//! Public key extraction from PIV attestation certificates.
//!
//! `ATTEST` returns an X.509 certificate, signed by the device's attestation
//! key, whose subject key is the key in the attested slot. Only the path down
//! to `SubjectPublicKeyInfo` is walked:
//!
//! ```text
//! Certificate ::= SEQUENCE {
//!     tbsCertificate SEQUENCE {
//!         version [0] EXPLICIT OPTIONAL,
//!         serialNumber, signature, issuer, validity, subject,
//!         subjectPublicKeyInfo SEQUENCE {
//!             algorithm SEQUENCE { OID, parameters },
//!             subjectPublicKey BIT STRING
//!         },
//!         ...
//!     },
//!     ...
//! }
//! ```
//!
//! The certificate signature is not checked here; the key is trusted because
//! it came from the card over the same session.

use crate::der::DerReader;
use crate::did_key::{Curve, PublicKey};
use crate::error::{Error, Result};

mod tag {
    pub(super) const SEQUENCE: u16 = 0x30;
    pub(super) const OID: u16 = 0x06;
    pub(super) const BIT_STRING: u16 = 0x03;
    pub(super) const VERSION: u16 = 0xA0;
}

/// DER value of the `id-ecPublicKey` OID (1.2.840.10045.2.1).
const ID_EC_PUBLIC_KEY: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];

/// DER value of the `prime256v1` OID (1.2.840.10045.3.1.7).
const PRIME256V1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];

/// DER value of the `secp384r1` OID (1.3.132.0.34).
const SECP384R1: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];

/// Extracts the subject public key from a DER certificate.
///
/// # Errors
///
/// Returns [`Error::MalformedCertificate`] if the structure cannot be walked.
/// The curve is reported as found; rejecting non-P-256 keys is left to the
/// caller.
pub fn subject_public_key(certificate: &[u8]) -> Result<PublicKey> {
    let malformed = |msg: &str| Error::MalformedCertificate(msg.to_string());

    let mut outer = DerReader::new(certificate);
    let cert = outer.read(tag::SEQUENCE).map_err(malformed)?;
    let mut cert = DerReader::new(cert);
    let tbs = cert.read(tag::SEQUENCE).map_err(malformed)?;

    let mut tbs = DerReader::new(tbs);
    if tbs.peek_tag() == Some(tag::VERSION) {
        tbs.read_any().map_err(malformed)?;
    }
    // serialNumber, signature, issuer, validity, subject
    for _ in 0..5 {
        tbs.read_any().map_err(malformed)?;
    }
    let spki = tbs.read(tag::SEQUENCE).map_err(malformed)?;

    let mut spki = DerReader::new(spki);
    let algorithm = spki.read(tag::SEQUENCE).map_err(malformed)?;
    let key_bits = spki.read(tag::BIT_STRING).map_err(malformed)?;

    let mut algorithm = DerReader::new(algorithm);
    let algorithm_oid = algorithm.read(tag::OID).map_err(malformed)?;
    let curve = if algorithm_oid == ID_EC_PUBLIC_KEY {
        let curve_oid = algorithm.read(tag::OID).map_err(malformed)?;
        match curve_oid {
            PRIME256V1 => Curve::P256,
            SECP384R1 => Curve::P384,
            other => Curve::Other(dotted_oid(other)),
        }
    } else {
        Curve::Other(dotted_oid(algorithm_oid))
    };

    let point = match key_bits.split_first() {
        Some((0x00, point)) if !point.is_empty() => point,
        _ => return Err(malformed("public key bit string is empty or not byte aligned")),
    };

    Ok(PublicKey::new(curve, point.to_vec()))
}

/// Renders OID content bytes in dotted decimal form.
fn dotted_oid(bytes: &[u8]) -> String {
    let mut arcs = Vec::new();
    let mut value = 0u64;
    for &byte in bytes {
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if arcs.is_empty() {
                let first = (value / 40).min(2);
                arcs.push(first);
                arcs.push(value - first * 40);
            } else {
                arcs.push(value);
            }
            value = 0;
        }
    }
    arcs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    const P256_CERT: &[u8] = include_bytes!("../../tests/data/attestation_p256.der");
    const P384_CERT: &[u8] = include_bytes!("../../tests/data/attestation_p384.der");

    #[test]
    fn extracts_p256_key() {
        let key = subject_public_key(P256_CERT).unwrap();

        assert_eq!(key.curve(), &Curve::P256);
        assert_eq!(
            hex::encode(key.point()),
            "0460fed4ba255a9d31c961eb74c6356d68c049b8923b61fa6ce669622e60f29fb6\
             7903fe1008b8bc99a41ae9e95628bc64f2f1b20c2d7e9f5177a3c294d4462299"
        );
    }

    #[test]
    fn reports_p384_curve() {
        let key = subject_public_key(P384_CERT).unwrap();

        assert_eq!(key.curve(), &Curve::P384);
        assert_eq!(key.point().len(), 97);
        assert!(matches!(
            key.verifying_key(),
            Err(Error::UnsupportedKeyMaterial(_))
        ));
    }

    #[test]
    fn rejects_truncated_certificate() {
        for len in [0, 4, 100, 200] {
            assert!(matches!(
                subject_public_key(&P256_CERT[..len]),
                Err(Error::MalformedCertificate(_))
            ));
        }
    }

    #[test]
    fn dotted_oid_formats() {
        assert_eq!(dotted_oid(PRIME256V1), "1.2.840.10045.3.1.7");
        assert_eq!(dotted_oid(SECP384R1), "1.3.132.0.34");
        // ed25519
        assert_eq!(dotted_oid(&[0x2B, 0x65, 0x70]), "1.3.101.112");
    }
}
