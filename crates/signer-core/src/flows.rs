//! The `sign`, `init`, `pubkey` and `list` commands.
//!
//! Each flow runs its stages in order and stops at the first error. Nothing
//! is written to the output until the result is complete; the functions
//! return the rendered text and the caller writes it in one go.
//!
//! ```text
//! sign:   read -> canonicalize -> digest -> locate -> attest -> touch
//!         -> sign -> decode -> low-S -> verify -> patch -> render
//! init:   locate -> confirm -> generate (PIN + touch always) -> did:key
//! pubkey: locate -> attest -> did:key
//! ```

use std::io::{BufRead, Read, Write};

use tracing::{debug, info};

use crate::config::Config;
use crate::crypto;
use crate::did_key::DidKey;
use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::signature::CompactSignature;
use crate::token::{SigningToken, TokenLocator};
use crate::yubikey::{KeyPolicy, Slot};

/// What the operator must type before a key is overwritten.
pub const CONFIRMATION_PHRASE: &str = "I understand";

/// Shown before the key in slot `9c` is replaced.
pub const OVERWRITE_WARNING: &str = "This action is destructive!\n\
    It will overwrite any existing key in the 'Digital Signature' slot, aka 9c.";

/// Shown right before the device blocks waiting for a touch.
pub const TOUCH_PROMPT: &str = "touch your YubiKey now";

/// Asks the operator to approve a destructive action.
pub trait Confirmation {
    /// Shows `warning` and returns whether the operator approved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the prompt cannot be shown or answered.
    fn confirm(&mut self, warning: &str) -> Result<bool>;
}

/// Approval given up front, e.g. with `--please-overwrite-my-keyslot`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlreadyConfirmed;

impl Confirmation for AlreadyConfirmed {
    fn confirm(&mut self, _warning: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Prompts on `output` and reads one line from `input`.
#[derive(Debug)]
pub struct PromptConfirmation<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirmation<R, W> {
    /// Creates a prompt over the given streams.
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirmation for PromptConfirmation<R, W> {
    fn confirm(&mut self, warning: &str) -> Result<bool> {
        writeln!(self.output, "{warning}")?;
        write!(
            self.output,
            "Please type '{CONFIRMATION_PHRASE}' to continue: "
        )?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(is_confirmation(&answer))
    }
}

/// Checks an answer against [`CONFIRMATION_PHRASE`].
///
/// Only the line terminator is stripped; the rest must match exactly,
/// ignoring case.
#[must_use]
pub fn is_confirmation(answer: &str) -> bool {
    let answer = answer
        .strip_suffix('\n')
        .map_or(answer, |line| line.strip_suffix('\r').unwrap_or(line));
    answer.eq_ignore_ascii_case(CONFIRMATION_PHRASE)
}

/// Signs the operation read from `input` with the key in slot `9c`.
///
/// `prompt` receives the touch prompt (normally stderr). Returns the signed
/// operation, pretty-printed with a trailing newline.
///
/// # Errors
///
/// Any stage failure: [`Error::MalformedInput`] for bad input, device errors,
/// [`Error::MalformedSignature`] for an unusable device signature and
/// [`Error::SignatureVerification`] if the result does not verify against
/// the attested key.
pub fn sign<L: TokenLocator>(
    locator: &L,
    config: &Config,
    input: impl Read,
    prompt: &mut impl Write,
) -> Result<String> {
    let mut operation = Operation::from_reader(input)?;
    let digest = operation.digest()?;
    debug!(digest = %hex::encode(digest), "canonicalized operation");

    let mut token = locator.locate(&config.selector)?;
    let verifying_key = token.attest(Slot::SIGNING)?.verifying_key()?;

    writeln!(prompt, "{TOUCH_PROMPT}")?;
    prompt.flush()?;
    let der = token.sign(Slot::SIGNING, &digest, &config.pin)?;

    let mut signature = CompactSignature::from_der(&der)?;
    if config.normalize_s {
        let (normalized, flipped) = signature.normalize_s();
        if flipped {
            debug!("signature folded into low-S form");
        }
        signature = normalized;
    }
    crypto::verify_compact(&digest, &signature, &verifying_key)?;
    info!("operation signed");

    operation.set_signature(&signature);
    operation.to_pretty_json()
}

/// Generates a new rotation key in slot `9c` and returns its `did:key`.
///
/// The key requires the PIN and a touch for every signature. No key is
/// generated unless `confirmation` approves.
///
/// # Errors
///
/// [`Error::UserDeclined`] if the operator does not confirm, otherwise
/// device and encoding errors.
pub fn init<L: TokenLocator>(
    locator: &L,
    config: &Config,
    confirmation: &mut impl Confirmation,
) -> Result<DidKey> {
    let mut token = locator.locate(&config.selector)?;

    if !confirmation.confirm(OVERWRITE_WARNING)? {
        return Err(Error::UserDeclined);
    }

    let public_key = token.generate(Slot::SIGNING, KeyPolicy::STRICT, &config.management_key)?;
    let did = DidKey::derive(&public_key, config.point_encoding)?;
    info!(did = %did, "generated rotation key");
    Ok(did)
}

/// Returns the `did:key` of the key in slot `9c`.
///
/// # Errors
///
/// Device errors, [`Error::SlotEmpty`] if there is no key, or
/// [`Error::UnsupportedKeyMaterial`] if it is not a P-256 key.
pub fn pubkey<L: TokenLocator>(locator: &L, config: &Config) -> Result<DidKey> {
    let mut token = locator.locate(&config.selector)?;
    let public_key = token.attest(Slot::SIGNING)?;
    DidKey::derive(&public_key, config.point_encoding)
}

/// Returns the connected readers, one per line, prefixed with the index
/// that `--reader-index` accepts.
///
/// # Errors
///
/// Returns an error if the readers cannot be listed.
pub fn list<L: TokenLocator>(locator: &L) -> Result<String> {
    let readers = locator.readers()?;
    Ok(readers
        .iter()
        .enumerate()
        .map(|(index, name)| format!("{index}: {name}\n"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_matches_phrase_ignoring_case() {
        assert!(is_confirmation("I understand\n"));
        assert!(is_confirmation("i UNDERSTAND\r\n"));
        assert!(is_confirmation("I understand"));
    }

    #[test]
    fn confirmation_is_exact() {
        assert!(!is_confirmation(""));
        assert!(!is_confirmation("yes\n"));
        assert!(!is_confirmation(" I understand\n"));
        assert!(!is_confirmation("I understand \n"));
        assert!(!is_confirmation("I understand\n\n"));
    }

    #[test]
    fn prompt_confirmation_reads_one_line() {
        let mut output = Vec::new();
        let mut prompt = PromptConfirmation::new(&b"i understand\nextra\n"[..], &mut output);

        assert!(prompt.confirm(OVERWRITE_WARNING).unwrap());
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.starts_with("This action is destructive!"));
        assert!(shown.ends_with("Please type 'I understand' to continue: "));
    }

    #[test]
    fn prompt_confirmation_declines_on_eof() {
        let mut prompt = PromptConfirmation::new(&b""[..], Vec::new());
        assert!(!prompt.confirm("warning").unwrap());
    }
}
