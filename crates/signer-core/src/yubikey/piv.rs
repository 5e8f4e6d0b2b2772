//! PIV session management and operations.
//!
//! This module provides the [`PivSession`] type for interacting with the
//! YubiKey PIV applet. It handles:
//!
//! - Applet selection
//! - PIN verification
//! - Management key authentication (3DES)
//! - Key generation with PIN and touch policies
//! - Attestation of a slot's key
//! - Signing a prehashed digest
//!
//! Responses longer than one short APDU are reassembled transparently with
//! `GET RESPONSE`.
//!
//! # Example
//!
//! ```ignore
//! use yubikey_plc_signer_core::yubikey::{PivSession, Slot, Transport};
//!
//! let transport: Box<dyn Transport> = /* obtain transport */;
//! let mut session = PivSession::new(transport);
//!
//! session.select()?;
//! let public_key = session.attested_public_key(Slot::SIGNING)?;
//!
//! session.verify_pin(&pin)?;
//! let der = session.sign(Slot::SIGNING, &digest)?;
//! ```

use std::fmt;

use des::TdesEde3;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use tracing::debug;

use super::Transport;
use super::apdu::{Apdu, ApduResponse, sw};
use super::certificate;
use super::slot::{KeyPolicy, Slot};
use crate::config::{ManagementKey, Pin};
use crate::der::{DerReader, write_len};
use crate::did_key::PublicKey;
use crate::error::{Error, Result};

/// The PIV applet AID (Application Identifier).
const PIV_AID: [u8; 9] = [0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00];

/// Upper bound on `GET RESPONSE` round trips for a single command.
const MAX_CHAINED_RESPONSES: usize = 64;

/// PIV instruction codes.
mod ins {
    /// `SELECT` instruction.
    pub(super) const SELECT: u8 = 0xA4;

    /// `VERIFY` instruction (for PIN).
    pub(super) const VERIFY: u8 = 0x20;

    /// `GENERAL AUTHENTICATE` instruction.
    pub(super) const AUTHENTICATE: u8 = 0x87;

    /// `GENERATE ASYMMETRIC KEY PAIR` instruction.
    pub(super) const GENERATE_ASYMMETRIC: u8 = 0x47;

    /// `GET RESPONSE` instruction.
    pub(super) const GET_RESPONSE: u8 = 0xC0;

    /// YubiKey `ATTEST` extension.
    pub(super) const ATTEST: u8 = 0xF9;
}

/// Key references.
mod key {
    /// PIV application PIN.
    pub(super) const PIN: u8 = 0x80;

    /// Management key.
    pub(super) const MANAGEMENT: u8 = 0x9B;
}

/// Algorithm identifiers.
mod alg {
    /// `ECCP256` (secp256r1/P-256).
    pub(super) const ECCP256: u8 = 0x11;

    /// `3DES` (Triple DES for management key).
    pub(super) const TDES: u8 = 0x03;
}

/// BER-TLV tags of PIV data objects.
mod tag {
    /// Dynamic authentication template.
    pub(super) const DYNAMIC_AUTH: u16 = 0x7C;
    /// Witness (management key authentication).
    pub(super) const WITNESS: u16 = 0x80;
    /// Challenge.
    pub(super) const CHALLENGE: u16 = 0x81;
    /// Response.
    pub(super) const RESPONSE: u16 = 0x82;

    /// Key generation control template.
    pub(super) const GENERATE_TEMPLATE: u8 = 0xAC;
    /// Algorithm reference inside the generation template.
    pub(super) const ALGORITHM: u8 = 0x80;
    /// YubiKey PIN policy.
    pub(super) const PIN_POLICY: u8 = 0xAA;
    /// YubiKey touch policy.
    pub(super) const TOUCH_POLICY: u8 = 0xAB;

    /// Public key data object.
    pub(super) const PUBLIC_KEY: u16 = 0x7F49;
    /// EC point inside the public key data object.
    pub(super) const EC_POINT: u16 = 0x86;
}

/// A session with the YubiKey PIV applet.
///
/// This type manages the connection to a YubiKey's PIV applet and provides
/// methods for key management and signing operations.
pub struct PivSession {
    /// The underlying transport.
    transport: Box<dyn Transport>,

    /// Whether the applet has been selected.
    selected: bool,

    /// Whether PIN has been verified since the last signature.
    pin_verified: bool,

    /// Whether management key has been authenticated.
    mgmt_authenticated: bool,
}

impl fmt::Debug for PivSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PivSession")
            .field("selected", &self.selected)
            .field("pin_verified", &self.pin_verified)
            .field("mgmt_authenticated", &self.mgmt_authenticated)
            .finish_non_exhaustive()
    }
}

impl PivSession {
    /// Creates a new PIV session with the given transport.
    ///
    /// The session is not yet active; call [`select`](Self::select) to
    /// activate the PIV applet.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            selected: false,
            pin_verified: false,
            mgmt_authenticated: false,
        }
    }

    /// Selects the PIV applet on the YubiKey.
    ///
    /// This must be called before any other PIV operations.
    ///
    /// # Errors
    ///
    /// Returns an error if communication fails or the applet is not present.
    pub fn select(&mut self) -> Result<()> {
        let apdu = Apdu::new(0x00, ins::SELECT, 0x04, 0x00, PIV_AID.to_vec());
        self.transmit(&apdu)?.check()?;

        self.selected = true;
        self.pin_verified = false;
        self.mgmt_authenticated = false;
        Ok(())
    }

    /// Verifies the user's PIN.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPin`] if the PIN is incorrect
    /// - [`Error::PinLocked`] if the PIN has been locked after too many attempts
    pub fn verify_pin(&mut self, pin: &Pin) -> Result<()> {
        self.require_selected()?;

        let pin_bytes = pin.expose().as_bytes();
        if pin_bytes.len() > 8 {
            return Err(Error::InvalidPin);
        }

        // Pad PIN to 8 bytes with 0xFF
        let mut padded_pin = [0xFF; 8];
        padded_pin[..pin_bytes.len()].copy_from_slice(pin_bytes);

        let apdu = Apdu::new(0x00, ins::VERIFY, 0x00, key::PIN, padded_pin.to_vec());
        self.transmit(&apdu)?.check()?;

        self.pin_verified = true;
        Ok(())
    }

    /// Authenticates with the management key using 3DES mutual
    /// authentication.
    ///
    /// The card proves knowledge of the key by encrypting a random host
    /// challenge; the host proves it by decrypting the card's witness.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagementKeyRejected`] if either side's proof fails.
    // TODO: support AES-192 management keys, the factory default from
    // YubiKey firmware 5.7 on.
    pub fn authenticate_management_key(&mut self, key: &ManagementKey) -> Result<()> {
        self.require_selected()?;
        self.mgmt_authenticated = false;

        let cipher = TdesEde3::new_from_slice(key.as_bytes())
            .map_err(|_| Error::InvalidConfig("management key must be 24 bytes".to_string()))?;

        // Step 1: ask the card for an encrypted witness
        let request = dynamic_auth(&[(tag::WITNESS, &[])]);
        let response = self.transmit(&Self::management_apdu(request))?;
        if !response.is_success() {
            debug!(sw = format_args!("{:04X}", response.status_word()), "witness refused");
            return Err(Error::ManagementKeyRejected);
        }

        let mut witness: [u8; 8] = find_in_dynamic_auth(response.data(), tag::WITNESS)?
            .try_into()
            .map_err(|_| Error::MalformedResponse("witness must be 8 bytes".to_string()))?;
        cipher.decrypt_block((&mut witness).into());

        // Step 2: return the decrypted witness along with our own challenge
        let challenge: [u8; 8] = rand::random();
        let mut expected = challenge;
        cipher.encrypt_block((&mut expected).into());

        let request = dynamic_auth(&[(tag::WITNESS, &witness), (tag::CHALLENGE, &challenge)]);
        let response = self.transmit(&Self::management_apdu(request))?;
        if !response.is_success() {
            debug!(sw = format_args!("{:04X}", response.status_word()), "witness rejected");
            return Err(Error::ManagementKeyRejected);
        }

        // Step 3: the card must have encrypted our challenge with the same key
        let card_response = find_in_dynamic_auth(response.data(), tag::RESPONSE)?;
        if card_response != expected {
            debug!("card response to host challenge does not match");
            return Err(Error::ManagementKeyRejected);
        }

        self.mgmt_authenticated = true;
        Ok(())
    }

    fn management_apdu(data: Vec<u8>) -> Apdu {
        Apdu::with_le(0x00, ins::AUTHENTICATE, alg::TDES, key::MANAGEMENT, data, 256)
    }

    /// Generates a new P-256 key pair in `slot`, replacing whatever was
    /// there.
    ///
    /// Requires a prior [`authenticate_management_key`](Self::authenticate_management_key).
    ///
    /// # Errors
    ///
    /// - [`Error::ManagementKeyRejected`] if the card reports missing authorization
    /// - [`Error::KeyGenerationFailed`] for any other failure
    pub fn generate_key(&mut self, slot: Slot, policy: KeyPolicy) -> Result<PublicKey> {
        self.require_selected()?;
        if !self.mgmt_authenticated {
            return Err(Error::ManagementKeyRejected);
        }

        let template = vec![
            tag::GENERATE_TEMPLATE,
            0x09,
            tag::ALGORITHM,
            0x01,
            alg::ECCP256,
            tag::PIN_POLICY,
            0x01,
            policy.pin as u8,
            tag::TOUCH_POLICY,
            0x01,
            policy.touch as u8,
        ];
        let apdu = Apdu::with_le(
            0x00,
            ins::GENERATE_ASYMMETRIC,
            0x00,
            slot.id(),
            template,
            256,
        );

        let response = self.transmit(&apdu)?;
        match response.status_word() {
            sw::SUCCESS => {}
            sw::SECURITY_STATUS => return Err(Error::ManagementKeyRejected),
            other => {
                return Err(Error::KeyGenerationFailed(
                    slot.id(),
                    format!("status word {other:04X}"),
                ));
            }
        }

        let point = parse_public_key_response(response.data())
            .map_err(|msg| Error::KeyGenerationFailed(slot.id(), msg.to_string()))?;
        Ok(PublicKey::p256(point.to_vec()))
    }

    /// Returns the attestation certificate (DER) for the key in `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlotEmpty`] if the slot holds no key that can be
    /// attested.
    pub fn attest(&mut self, slot: Slot) -> Result<Vec<u8>> {
        self.require_selected()?;

        let apdu = Apdu::with_le(0x00, ins::ATTEST, slot.id(), 0x00, vec![], 256);
        let response = self.transmit(&apdu)?;
        match response.status_word() {
            sw::SUCCESS => Ok(response.into_data()),
            sw::NOT_FOUND | sw::INCORRECT_DATA => Err(Error::SlotEmpty(slot.id())),
            _ => Err(response.to_error()),
        }
    }

    /// Attests `slot` and extracts the public key from the certificate.
    ///
    /// # Errors
    ///
    /// See [`attest`](Self::attest); a certificate that cannot be walked is
    /// [`Error::MalformedCertificate`].
    pub fn attested_public_key(&mut self, slot: Slot) -> Result<PublicKey> {
        let certificate = self.attest(slot)?;
        certificate::subject_public_key(&certificate)
    }

    /// Signs a SHA-256 digest with the key in `slot` and returns the DER
    /// signature.
    ///
    /// Blocks until the key is touched when the slot's touch policy asks for
    /// it. The PIN verification is consumed by the attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPin`] if the PIN was not verified first
    /// - [`Error::TouchTimeout`] if the touch was not received
    /// - [`Error::SlotEmpty`] if there is no key in the slot
    pub fn sign(&mut self, slot: Slot, digest: &[u8; 32]) -> Result<Vec<u8>> {
        self.require_selected()?;
        if !self.pin_verified {
            return Err(Error::InvalidPin);
        }
        self.pin_verified = false;

        let template = dynamic_auth(&[(tag::RESPONSE, &[]), (tag::CHALLENGE, digest)]);
        let apdu = Apdu::with_le(
            0x00,
            ins::AUTHENTICATE,
            alg::ECCP256,
            slot.id(),
            template,
            256,
        );

        let response = self.transmit(&apdu)?;
        match response.status_word() {
            sw::SUCCESS => {}
            sw::CONDITIONS_OF_USE => return Err(Error::TouchTimeout),
            sw::NOT_FOUND => return Err(Error::SlotEmpty(slot.id())),
            _ => return Err(response.to_error()),
        }

        Ok(find_in_dynamic_auth(response.data(), tag::RESPONSE)?.to_vec())
    }

    /// Checks if the session is connected and active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected {
            Ok(())
        } else {
            Err(Error::ApduError("PIV applet not selected".to_string()))
        }
    }

    /// Sends a command and follows `61xx` chaining until the card is done.
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        debug!(
            ins = format_args!("{:02X}", apdu.ins()),
            p1 = format_args!("{:02X}", apdu.p1()),
            p2 = format_args!("{:02X}", apdu.p2()),
            "sending APDU"
        );
        let mut response = self.transport.transmit(apdu)?;

        let mut data = Vec::new();
        let mut rounds = 0;
        while let Some(remaining) = response.remaining_bytes() {
            rounds += 1;
            if rounds > MAX_CHAINED_RESPONSES {
                return Err(Error::MalformedResponse(
                    "card kept chaining the response".to_string(),
                ));
            }
            data.extend_from_slice(response.data());
            let next = Apdu::with_le(0x00, ins::GET_RESPONSE, 0x00, 0x00, vec![], remaining);
            response = self.transport.transmit(&next)?;
        }

        debug!(
            sw = format_args!("{:04X}", response.status_word()),
            len = data.len() + response.data().len(),
            "received response"
        );

        if data.is_empty() {
            return Ok(response);
        }
        data.extend_from_slice(response.data());
        Ok(ApduResponse::new(data, response.sw1(), response.sw2()))
    }
}

/// Builds a dynamic authentication template (`7C`) from tag/value pairs.
fn dynamic_auth(items: &[(u16, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (item_tag, value) in items {
        body.push(*item_tag as u8);
        write_len(&mut body, value.len());
        body.extend_from_slice(value);
    }

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(tag::DYNAMIC_AUTH as u8);
    write_len(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

/// Finds one element inside a dynamic authentication template.
fn find_in_dynamic_auth(data: &[u8], item_tag: u16) -> Result<&[u8]> {
    let malformed = |msg: &str| Error::MalformedResponse(format!("dynamic auth template: {msg}"));

    let template = DerReader::new(data)
        .read(tag::DYNAMIC_AUTH)
        .map_err(malformed)?;
    DerReader::new(template).find(item_tag).map_err(malformed)
}

/// Extracts the EC point from a `GENERATE ASYMMETRIC` response.
fn parse_public_key_response(data: &[u8]) -> core::result::Result<&[u8], &'static str> {
    // 7F49 len 86 len point
    let object = DerReader::new(data).read(tag::PUBLIC_KEY)?;
    let point = DerReader::new(object).find(tag::EC_POINT)?;
    if point.is_empty() {
        return Err("empty EC point");
    }
    Ok(point)
}
