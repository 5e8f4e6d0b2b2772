//! Error types for the YubiKey `did:plc` signer.
//!
//! This module provides a single error type [`enum@Error`] covering every
//! failure mode of the tool, from locating the YubiKey to encoding the final
//! signature.
//!
//! # Error Categories
//!
//! - **Device errors**: discovery, PIN and management key checks, touch
//! - **Slot errors**: empty slots, key generation, foreign key material
//! - **APDU errors**: transport failures and unexpected status words
//! - **Encoding errors**: canonical CBOR, DER signatures, curve points
//! - **Input and operator errors**: bad JSON on stdin, declined confirmation
//!
//! Every error is fatal to the current invocation; nothing in this crate
//! retries.
//!
//! # Example
//!
//! ```
//! use yubikey_plc_signer_core::Error;
//!
//! let err = Error::TouchTimeout;
//! assert_eq!(err.to_string(), "touch confirmation timeout");
//! ```

use core::result::Result as CoreResult;
use std::io::Error as IoError;

use hex::FromHexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The main error type for the YubiKey `did:plc` signer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // YubiKey Device Errors
    // =========================================================================
    /// No YubiKey device was found.
    #[error("no YubiKey device found")]
    DeviceNotFound,

    /// More than one YubiKey is connected and none was selected explicitly.
    #[error("{} YubiKey readers connected ({}), select one by name or index", .0.len(), .0.join(", "))]
    AmbiguousDevice(Vec<String>),

    /// Failed to connect to the YubiKey device.
    #[error("failed to connect to YubiKey: {0}")]
    ConnectionFailed(String),

    /// The provided PIN is invalid.
    #[error("invalid PIN")]
    InvalidPin,

    /// The PIN has been locked after too many failed attempts.
    #[error("PIN is locked after too many failed attempts")]
    PinLocked,

    /// The card did not accept the management key.
    #[error("management key rejected by the YubiKey")]
    ManagementKeyRejected,

    /// Touch confirmation was not received within the timeout period.
    #[error("touch confirmation timeout")]
    TouchTimeout,

    // =========================================================================
    // PIV Slot Errors
    // =========================================================================
    /// The specified PIV slot is empty (no key present).
    #[error("PIV slot {0:#04x} is empty")]
    SlotEmpty(u8),

    /// The key material is not a P-256 ECDSA key.
    #[error("unsupported key material: {0}")]
    UnsupportedKeyMaterial(String),

    /// Failed to generate a key in the specified slot.
    #[error("failed to generate key in slot {0:#04x}: {1}")]
    KeyGenerationFailed(u8, String),

    // =========================================================================
    // APDU Communication Errors
    // =========================================================================
    /// Failed to send an APDU command to the YubiKey.
    #[error("APDU command failed: {0}")]
    ApduError(String),

    /// The YubiKey returned an unexpected status word.
    #[error("unexpected status word: SW1={0:#04x}, SW2={1:#04x}")]
    UnexpectedStatusWord(u8, u8),

    /// The response from the YubiKey was malformed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The attestation certificate could not be parsed.
    #[error("malformed attestation certificate: {0}")]
    MalformedCertificate(String),

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// The document could not be canonically encoded.
    #[error("canonical encoding failed: {0}")]
    Encoding(String),

    /// The DER signature could not be converted to the compact form.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// The public key point could not be decoded or rendered.
    #[error("point encoding error: {0}")]
    PointEncoding(String),

    /// The signature returned by the device does not verify against the
    /// slot's public key.
    #[error("signature does not verify against the slot public key")]
    SignatureVerification,

    // =========================================================================
    // Input, Operator and Configuration Errors
    // =========================================================================
    /// The input document is not a JSON object.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The operator did not confirm a destructive action.
    #[error("destructive action not confirmed by the operator")]
    UserDeclined,

    /// A configuration value is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Error::InvalidConfig(format!("hex decoding failed: {err}"))
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

/// A specialized [`Result`] type for signer operations.
pub type Result<T> = CoreResult<T, Error>;

#[cfg(test)]
mod tests {
    use serde_json::{Value, from_str};

    use super::*;

    #[test]
    fn error_display() {
        let err = Error::DeviceNotFound;
        assert_eq!(err.to_string(), "no YubiKey device found");

        let err = Error::SlotEmpty(0x9c);
        assert_eq!(err.to_string(), "PIV slot 0x9c is empty");

        let err = Error::UnexpectedStatusWord(0x69, 0x82);
        assert_eq!(
            err.to_string(),
            "unexpected status word: SW1=0x69, SW2=0x82"
        );
    }

    #[test]
    fn ambiguous_device_lists_readers() {
        let err = Error::AmbiguousDevice(vec![
            "Yubico YubiKey OTP+FIDO+CCID 00 00".to_string(),
            "Yubico YubiKey OTP+FIDO+CCID 01 00".to_string(),
        ]);
        let message = err.to_string();
        assert!(message.starts_with("2 YubiKey readers connected"));
        assert!(message.contains("CCID 01 00"));
        assert!(message.ends_with("select one by name or index"));
        assert!(!message.contains("--"));
    }

    #[test]
    fn from_hex_error() {
        let hex_err = FromHexError::InvalidHexCharacter { c: 'g', index: 0 };
        let err: Error = hex_err.into();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn from_json_error() {
        let json_str = "not valid json{";
        let json_err = from_str::<Value>(json_str).unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn from_io_error() {
        let io_err = IoError::other("broken pipe");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
