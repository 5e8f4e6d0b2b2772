//! YubiKey PIV communication module.
//!
//! This module provides low-level communication with YubiKey devices using
//! the PIV (Personal Identity Verification) applet. It supports:
//!
//! - Device discovery and connection
//! - APDU command/response handling
//! - PIV operations (key generation, attestation, signing, authentication)
//!
//! # Architecture
//!
//! The module is organized into several submodules:
//!
//! - [`apdu`]: APDU command/response types and encoding
//! - [`certificate`]: public key extraction from attestation certificates
//! - [`piv`]: PIV-specific commands and operations
//! - [`slot`]: PIV slots and key policies
//!
//! # Transport Abstraction
//!
//! The [`Transport`] trait abstracts over how APDUs reach the card. The
//! `pcsc` feature provides a PC/SC implementation; tests drive
//! [`PivSession`] with simulated cards.

pub mod apdu;
pub mod certificate;
pub mod piv;
pub mod slot;

#[cfg(feature = "pcsc")]
pub mod pcsc_transport;

pub use apdu::{Apdu, ApduResponse};
pub use piv::PivSession;
pub use slot::{KeyPolicy, PinPolicy, Slot, TouchPolicy};

#[cfg(feature = "pcsc")]
pub use pcsc_transport::PcscTransport;

use crate::error::Result;

/// A transport layer for communicating with a YubiKey.
pub trait Transport {
    /// Sends one APDU command and receives the card's response.
    ///
    /// Response chaining (`61xx`) is not followed here; [`PivSession`]
    /// takes care of it.
    ///
    /// # Errors
    ///
    /// Returns an error if communication fails.
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse>;

    /// Checks if the transport is still connected.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::Error;

    /// A mock transport replaying canned responses.
    struct MockTransport {
        responses: VecDeque<ApduResponse>,
    }

    impl Transport for MockTransport {
        fn transmit(&mut self, _apdu: &Apdu) -> Result<ApduResponse> {
            self.responses
                .pop_front()
                .ok_or_else(|| Error::ApduError("no response".to_string()))
        }

        fn is_connected(&self) -> bool {
            !self.responses.is_empty()
        }
    }

    #[test]
    fn session_over_boxed_transport() {
        let transport = MockTransport {
            responses: VecDeque::from([ApduResponse::new(vec![], 0x90, 0x00)]),
        };
        let mut session = PivSession::new(Box::new(transport));

        assert!(session.is_connected());
        session.select().unwrap();
        assert!(!session.is_connected());
        assert!(matches!(session.select(), Err(Error::ApduError(_))));
    }
}
