//! The hardware token as a capability.
//!
//! The flows only talk to a [`SigningToken`], found through a
//! [`TokenLocator`]. [`PivToken`] is the YubiKey implementation over a
//! [`PivSession`]; tests substitute software tokens.

use tracing::info;

use crate::config::{DeviceSelector, ManagementKey, Pin};
use crate::did_key::PublicKey;
use crate::error::Result;
use crate::yubikey::{KeyPolicy, PivSession, Slot, Transport};

/// A device holding private keys that can attest, generate and sign.
pub trait SigningToken {
    /// Returns the public key currently in `slot`.
    ///
    /// # Errors
    ///
    /// Device errors, or [`Error::SlotEmpty`](crate::Error::SlotEmpty).
    fn attest(&mut self, slot: Slot) -> Result<PublicKey>;

    /// Generates a fresh key in `slot`, destroying the previous one.
    ///
    /// # Errors
    ///
    /// Device errors, or
    /// [`Error::ManagementKeyRejected`](crate::Error::ManagementKeyRejected).
    fn generate(
        &mut self,
        slot: Slot,
        policy: KeyPolicy,
        management_key: &ManagementKey,
    ) -> Result<PublicKey>;

    /// Signs a SHA-256 digest with the key in `slot` and returns the DER
    /// signature.
    ///
    /// Makes exactly one signing request and blocks until the operator
    /// touches the device or the device gives up.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPin`](crate::Error::InvalidPin),
    /// [`Error::TouchTimeout`](crate::Error::TouchTimeout) and other device
    /// errors.
    fn sign(&mut self, slot: Slot, digest: &[u8; 32], pin: &Pin) -> Result<Vec<u8>>;
}

/// Finds and opens tokens.
pub trait TokenLocator {
    /// The token type this locator opens.
    type Token: SigningToken;

    /// Lists the names of the connected readers.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader subsystem is unavailable.
    fn readers(&self) -> Result<Vec<String>>;

    /// Opens the token picked by `selector`.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceNotFound`](crate::Error::DeviceNotFound),
    /// [`Error::AmbiguousDevice`](crate::Error::AmbiguousDevice) or a
    /// connection failure.
    fn locate(&self, selector: &DeviceSelector) -> Result<Self::Token>;
}

/// A YubiKey PIV applet as a [`SigningToken`].
#[derive(Debug)]
pub struct PivToken {
    session: PivSession,
}

impl PivToken {
    /// Opens a PIV session over `transport` and selects the applet.
    ///
    /// # Errors
    ///
    /// Returns an error if the applet cannot be selected.
    pub fn open(transport: Box<dyn Transport>) -> Result<Self> {
        let mut session = PivSession::new(transport);
        session.select()?;
        Ok(Self { session })
    }
}

impl SigningToken for PivToken {
    fn attest(&mut self, slot: Slot) -> Result<PublicKey> {
        self.session.attested_public_key(slot)
    }

    fn generate(
        &mut self,
        slot: Slot,
        policy: KeyPolicy,
        management_key: &ManagementKey,
    ) -> Result<PublicKey> {
        self.session.authenticate_management_key(management_key)?;
        info!(slot = %slot, "generating P-256 key");
        self.session.generate_key(slot, policy)
    }

    fn sign(&mut self, slot: Slot, digest: &[u8; 32], pin: &Pin) -> Result<Vec<u8>> {
        self.session.verify_pin(pin)?;
        self.session.sign(slot, digest)
    }
}

/// Locates YubiKeys through PC/SC.
#[cfg(feature = "pcsc")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PcscLocator;

#[cfg(feature = "pcsc")]
impl TokenLocator for PcscLocator {
    type Token = PivToken;

    fn readers(&self) -> Result<Vec<String>> {
        crate::yubikey::PcscTransport::list_readers()
    }

    fn locate(&self, selector: &DeviceSelector) -> Result<PivToken> {
        let transport = crate::yubikey::PcscTransport::connect(selector)?;
        PivToken::open(Box::new(transport))
    }
}
