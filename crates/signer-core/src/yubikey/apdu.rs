//! APDU (Application Protocol Data Unit) command and response types.
//!
//! This module provides types for constructing and parsing ISO 7816-4 APDU
//! commands and responses used to communicate with smart cards.
//!
//! # APDU Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data | Le |
//! |-----|-----|----|----|----|----- |----|
//! | 1B  | 1B  | 1B | 1B | 1B | Var  | 1B |
//! ```
//!
//! # APDU Response Structure
//!
//! ```text
//! | Data | SW1 | SW2 |
//! |------|-----|-----|
//! | Var  | 1B  | 1B  |
//! ```
//!
//! A response with `SW1 = 0x61` carries only part of the data; the rest is
//! fetched with `GET RESPONSE` (see [`PivSession`](super::PivSession)).
//!
//! # Example
//!
//! ```
//! use yubikey_plc_signer_core::yubikey::{Apdu, ApduResponse};
//!
//! // SELECT the PIV applet
//! let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![
//!     0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00
//! ]);
//! assert_eq!(apdu.to_bytes()[4], 9);
//!
//! let response = ApduResponse::from_bytes(vec![0x90, 0x00]).unwrap();
//! assert!(response.is_success());
//! ```

use crate::error::{Error, Result};

/// Status words the PIV applet answers with.
pub mod sw {
    /// Command completed.
    pub const SUCCESS: u16 = 0x9000;
    /// Security status not satisfied (PIN or management key missing).
    pub const SECURITY_STATUS: u16 = 0x6982;
    /// Authentication method blocked.
    pub const AUTH_BLOCKED: u16 = 0x6983;
    /// Conditions of use not satisfied (touch not received in time).
    pub const CONDITIONS_OF_USE: u16 = 0x6985;
    /// Incorrect parameters in the data field.
    pub const INCORRECT_DATA: u16 = 0x6A80;
    /// File or key not found.
    pub const NOT_FOUND: u16 = 0x6A82;
}

/// An APDU command.
///
/// Represents an ISO 7816-4 APDU command to be sent to a smart card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Class byte.
    cla: u8,

    /// Instruction byte.
    ins: u8,

    /// Parameter 1.
    p1: u8,

    /// Parameter 2.
    p2: u8,

    /// Command data.
    data: Vec<u8>,

    /// Expected response length (0 = none).
    le: u16,
}

impl Apdu {
    /// Maximum short APDU data length.
    pub const MAX_SHORT_DATA: usize = 255;

    /// Creates a new APDU command with Le absent.
    #[must_use]
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self::with_le(cla, ins, p1, p2, data, 0)
    }

    /// Creates a new APDU command with an expected response length.
    ///
    /// An `le` of 256 asks for as much as fits in a short response.
    #[must_use]
    pub const fn with_le(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>, le: u16) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        }
    }

    /// Returns the class byte.
    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the expected response length.
    #[must_use]
    pub const fn le(&self) -> u16 {
        self.le
    }

    /// Serializes the APDU to bytes.
    ///
    /// Short form is used while the data fits in 255 bytes and Le is at most
    /// 256; extended form otherwise.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len() + 3);
        bytes.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);

        let use_extended = self.data.len() > Self::MAX_SHORT_DATA || self.le > 256;

        if use_extended {
            if !self.data.is_empty() {
                bytes.push(0x00);
                bytes.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
                bytes.extend_from_slice(&self.data);
            }
            if self.le > 0 {
                if self.data.is_empty() {
                    bytes.push(0x00);
                }
                bytes.extend_from_slice(&self.le.to_be_bytes());
            }
        } else {
            if !self.data.is_empty() {
                bytes.push(self.data.len() as u8);
                bytes.extend_from_slice(&self.data);
            }
            if self.le > 0 {
                // 256 wraps to 0x00 in short form
                bytes.push(self.le as u8);
            }
        }

        bytes
    }
}

/// An APDU response from a smart card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data.
    data: Vec<u8>,

    /// Status word 1.
    sw1: u8,

    /// Status word 2.
    sw2: u8,
}

impl ApduResponse {
    /// Creates a response from its parts.
    #[must_use]
    pub const fn new(data: Vec<u8>, sw1: u8, sw2: u8) -> Self {
        Self { data, sw1, sw2 }
    }

    /// Splits raw response bytes into data and status word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if fewer than 2 bytes were
    /// received.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        let (Some(sw2), Some(sw1)) = (bytes.pop(), bytes.pop()) else {
            return Err(Error::MalformedResponse(
                "response shorter than a status word".to_string(),
            ));
        };
        Ok(Self::new(bytes, sw1, sw2))
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns status word 1.
    #[must_use]
    pub const fn sw1(&self) -> u8 {
        self.sw1
    }

    /// Returns status word 2.
    #[must_use]
    pub const fn sw2(&self) -> u8 {
        self.sw2
    }

    /// Returns the full status word as a [`u16`].
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Checks if the response indicates success (`SW = 0x9000`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_word() == sw::SUCCESS
    }

    /// Checks if more data is available (`SW1 = 0x61`).
    #[must_use]
    pub const fn has_more_data(&self) -> bool {
        self.sw1 == 0x61
    }

    /// Returns the number of bytes still waiting on the card, if any.
    ///
    /// `SW2 = 0x00` means 256 or more.
    #[must_use]
    pub const fn remaining_bytes(&self) -> Option<u16> {
        if !self.has_more_data() {
            None
        } else if self.sw2 == 0 {
            Some(256)
        } else {
            Some(self.sw2 as u16)
        }
    }

    /// Returns an error unless the status word is `0x9000`.
    ///
    /// # Errors
    ///
    /// See [`Self::to_error`].
    pub const fn check(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.to_error())
        }
    }

    /// Converts the status word to an error without command context.
    ///
    /// Callers that know which slot or operation was involved refine this
    /// (e.g. `0x6A82` becomes [`Error::SlotEmpty`] for that slot).
    #[must_use]
    pub const fn to_error(&self) -> Error {
        match (self.sw1, self.sw2) {
            (0x63, 0xC0..=0xCF) => {
                let attempts = self.sw2 & 0x0F;
                if attempts == 0 {
                    Error::PinLocked
                } else {
                    Error::InvalidPin
                }
            }
            (0x69, 0x82) => Error::InvalidPin,
            (0x69, 0x83) => Error::PinLocked,
            _ => Error::UnexpectedStatusWord(self.sw1, self.sw2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apdu_new() {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![0xA0, 0x00]);

        assert_eq!(apdu.cla(), 0x00);
        assert_eq!(apdu.ins(), 0xA4);
        assert_eq!(apdu.p1(), 0x04);
        assert_eq!(apdu.p2(), 0x00);
        assert_eq!(apdu.data(), &[0xA0, 0x00]);
        assert_eq!(apdu.le(), 0);
    }

    #[test]
    fn apdu_to_bytes_short() {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![0xA0, 0x00]);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0xA4, 0x04, 0x00, 0x02, 0xA0, 0x00]);
    }

    #[test]
    fn apdu_to_bytes_no_data() {
        let apdu = Apdu::new(0x00, 0xF9, 0x9C, 0x00, vec![]);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0xF9, 0x9C, 0x00]);
    }

    #[test]
    fn apdu_to_bytes_with_le() {
        let apdu = Apdu::with_le(0x00, 0xC0, 0x00, 0x00, vec![], 256);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0xC0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn apdu_to_bytes_extended() {
        let apdu = Apdu::with_le(0x00, 0x87, 0x11, 0x9C, vec![0xAB; 300], 256);
        let bytes = apdu.to_bytes();

        assert_eq!(&bytes[4..7], &[0x00, 0x01, 0x2C]);
        assert_eq!(bytes.len(), 4 + 3 + 300 + 2);
        assert_eq!(&bytes[307..], &[0x01, 0x00]);
    }

    #[test]
    fn apdu_response_from_bytes() {
        let response = ApduResponse::from_bytes(vec![0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();

        assert_eq!(response.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(response.sw1(), 0x90);
        assert_eq!(response.sw2(), 0x00);
        assert!(response.is_success());
        assert_eq!(response.into_data(), vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn apdu_response_too_short() {
        assert!(matches!(
            ApduResponse::from_bytes(vec![0x90]),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn apdu_response_more_data() {
        let response = ApduResponse::new(vec![], 0x61, 0x10);

        assert!(!response.is_success());
        assert!(response.has_more_data());
        assert_eq!(response.remaining_bytes(), Some(0x10));
        assert_eq!(ApduResponse::new(vec![], 0x61, 0x00).remaining_bytes(), Some(256));
        // chaining is not success on its own
        assert!(response.check().is_err());
    }

    #[test]
    fn apdu_response_pin_errors() {
        assert!(matches!(
            ApduResponse::new(vec![], 0x63, 0xC2).to_error(),
            Error::InvalidPin
        ));
        assert!(matches!(
            ApduResponse::new(vec![], 0x63, 0xC0).to_error(),
            Error::PinLocked
        ));
        assert!(matches!(
            ApduResponse::new(vec![], 0x69, 0x83).to_error(),
            Error::PinLocked
        ));
    }

    #[test]
    fn apdu_response_other_errors() {
        let err = ApduResponse::new(vec![], 0x6D, 0x00).check().unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatusWord(0x6D, 0x00)));
    }
}
