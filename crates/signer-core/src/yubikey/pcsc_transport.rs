//! PC/SC transport for native YubiKey communication.
//!
//! This module provides a [`Transport`] implementation using the PC/SC
//! (Personal Computer/Smart Card) interface, which works on macOS, Linux,
//! and Windows.
//!
//! # Example
//!
//! ```ignore
//! use yubikey_plc_signer_core::DeviceSelector;
//! use yubikey_plc_signer_core::yubikey::{PcscTransport, PivSession, Slot};
//!
//! let transport = PcscTransport::connect(&DeviceSelector::Only)?;
//! let mut session = PivSession::new(Box::new(transport));
//!
//! session.select()?;
//! let public_key = session.attested_public_key(Slot::SIGNING)?;
//! ```

use pcsc::{Card, Context, Protocols, Scope, ShareMode};
use tracing::{debug, info};

use super::Transport;
use super::apdu::{Apdu, ApduResponse};
use crate::config::DeviceSelector;
use crate::error::{Error, Result};

/// Response buffer size: 256 data bytes plus the status word.
const MAX_RESPONSE_LEN: usize = 258;

/// A PC/SC transport for communicating with a YubiKey.
///
/// This transport uses the system's PC/SC daemon to communicate with
/// the YubiKey's smart card interface (CCID).
pub struct PcscTransport {
    /// The PC/SC card handle.
    card: Card,

    /// Name of the reader the card sits in.
    reader: String,
}

impl std::fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

impl PcscTransport {
    /// Connects to the reader picked by `selector`.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] if no reader matches
    /// - [`Error::AmbiguousDevice`] if several readers match
    /// - [`Error::ConnectionFailed`] if connection fails
    pub fn connect(selector: &DeviceSelector) -> Result<Self> {
        let ctx = establish()?;
        let readers = reader_names(&ctx)?;
        let reader = selector.select(&readers)?.to_string();

        let name = std::ffi::CString::new(reader.as_str())
            .map_err(|_| Error::ConnectionFailed(format!("invalid reader name {reader:?}")))?;
        let card = ctx
            .connect(&name, ShareMode::Shared, Protocols::ANY)
            .map_err(|e| Error::ConnectionFailed(format!("failed to connect to {reader}: {e}")))?;

        info!(reader = %reader, "connected to YubiKey");
        Ok(Self { card, reader })
    }

    /// Lists the names of all connected readers, in PC/SC order.
    ///
    /// The position in this list is what [`DeviceSelector::Index`] refers
    /// to.
    ///
    /// # Errors
    ///
    /// Returns an error if PC/SC context cannot be established.
    pub fn list_readers() -> Result<Vec<String>> {
        reader_names(&establish()?)
    }

    /// Returns the name of the connected reader.
    #[must_use]
    pub fn reader(&self) -> &str {
        &self.reader
    }
}

fn establish() -> Result<Context> {
    Context::establish(Scope::User)
        .map_err(|e| Error::ConnectionFailed(format!("failed to establish PC/SC context: {e}")))
}

fn reader_names(ctx: &Context) -> Result<Vec<String>> {
    let mut readers_buf = vec![0u8; 2048];
    match ctx.list_readers(&mut readers_buf) {
        Ok(readers) => {
            let names: Vec<String> = readers
                .map(|r| r.to_string_lossy().into_owned())
                .collect();
            debug!(count = names.len(), "listed PC/SC readers");
            Ok(names)
        }
        // pcsc-lite reports an empty reader list as an error
        Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
        Err(e) => Err(Error::ConnectionFailed(format!(
            "failed to list readers: {e}"
        ))),
    }
}

impl Transport for PcscTransport {
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        let command = apdu.to_bytes();
        let mut response_buf = [0u8; MAX_RESPONSE_LEN];

        let response = self
            .card
            .transmit(&command, &mut response_buf)
            .map_err(|e| Error::ApduError(format!("transmit failed: {e}")))?;

        ApduResponse::from_bytes(response.to_vec())
    }

    fn is_connected(&self) -> bool {
        // Try to get card status to check if still connected
        self.card.status2_owned().is_ok()
    }
}
