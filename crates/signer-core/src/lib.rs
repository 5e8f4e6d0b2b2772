//! YubiKey `did:plc` Signer Core Library
//!
//! This crate signs `did:plc` operations with a P-256 rotation key that never
//! leaves a YubiKey's PIV applet.
//!
//! # Overview
//!
//! A `did:plc` operation is a JSON object. Its signature covers the
//! DAG-CBOR encoding of the object without its `sig` field, and is stored back
//! into `sig` as unpadded base64url of the 64-byte `r || s` form. The rotation
//! key is identified by its `did:key`.
//!
//! This library provides:
//!
//! - **Canonical Encoding**: deterministic DAG-CBOR of JSON documents
//! - **Signature Codec**: DER to compact conversion, low-S, verification
//! - **Key Identifiers**: `did:key` derivation and parsing for P-256 keys
//! - **YubiKey Integration**: PIV applet communication for attestation,
//!   key generation and signing
//! - **Flows**: the `sign`, `init`, `pubkey` and `list` commands
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    flows (sign / init / pubkey)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Operation   │  Canonical   │  Signature   │    DidKey      │
//! │  (JSON doc)  │  (DAG-CBOR)  │   (codec)    │  (identifier)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │           token: SigningToken / TokenLocator                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    YubiKey PIV Layer                        │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────────────┐ │
//! │  │  Slot   │  │  APDU   │  │   PIV   │  │    Transport    │ │
//! │  │ Policy  │  │ Encode  │  │ Session │  │   (PC/SC)       │ │
//! │  └─────────┘  └─────────┘  └─────────┘  └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Computing the digest of an operation
//!
//! ```rust
//! use yubikey_plc_signer_core::Operation;
//!
//! let op = Operation::from_json(r#"{"foo": "bar", "sig": "stale"}"#).unwrap();
//! let digest = op.digest().unwrap();
//! assert_eq!(
//!     hex::encode(digest),
//!     "2b03a649d6ce093e2a6a90ab4638f896d4362a7fb093ac4a2f2aa688610383bc"
//! );
//! ```
//!
//! ## Converting a device signature
//!
//! ```rust
//! use yubikey_plc_signer_core::CompactSignature;
//!
//! let der = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
//! let sig = CompactSignature::from_der(&der).unwrap();
//! assert_eq!(sig.to_bytes().len(), 64);
//! ```
//!
//! ## Signing with a YubiKey
//!
//! ```ignore
//! use yubikey_plc_signer_core::{Config, PcscLocator, flows};
//!
//! let config = Config::default();
//! let signed = flows::sign(&PcscLocator, &config, std::io::stdin(), &mut std::io::stderr())?;
//! print!("{signed}");
//! ```
//!
//! # Feature Flags
//!
//! - `pcsc`: PC/SC transport and [`PcscLocator`] for talking to real devices.
//!   Without it, bring your own [`yubikey::Transport`].
//!
//! # Security Considerations
//!
//! - Private keys never leave the YubiKey hardware
//! - Keys are generated with PIN and touch required for every signature
//! - Every signature is verified against the attested key before output
//! - Signatures are normalized to low-S form unless disabled
//! - The factory PIN and management key are used unless overridden

// Modules
pub mod canonical;
pub mod config;
pub mod crypto;
mod der;
pub mod did_key;
pub mod error;
pub mod flows;
pub mod operation;
pub mod signature;
pub mod token;
pub mod yubikey;

// Re-exports for convenience
pub use config::{
    Config, DEFAULT_MANAGEMENT_KEY, DEFAULT_PIN, DeviceSelector, ManagementKey, Pin,
};
pub use did_key::{Curve, DidKey, PointEncoding, PublicKey};
pub use error::{Error, Result};
pub use operation::Operation;
pub use signature::CompactSignature;
#[cfg(feature = "pcsc")]
pub use token::PcscLocator;
pub use token::{PivToken, SigningToken, TokenLocator};
