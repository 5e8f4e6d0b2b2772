//! PIV slots and per-key policies.
//!
//! | Slot | ID   | Purpose                          |
//! |------|------|----------------------------------|
//! | 9a   | 0x9A | PIV Authentication               |
//! | 9c   | 0x9C | Digital Signature                |
//! | 9d   | 0x9D | Key Management                   |
//! | 9e   | 0x9E | Card Authentication              |
//!
//! The signer always uses slot `9c`, see [`Slot::SIGNING`].
//!
//! # Example
//!
//! ```
//! use yubikey_plc_signer_core::yubikey::Slot;
//!
//! assert_eq!(Slot::SIGNING.id(), 0x9C);
//! assert_eq!(Slot::SIGNING.to_string(), "Digital Signature (9c)");
//! ```

use core::fmt;

/// A PIV slot on the YubiKey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Slot {
    /// PIV Authentication slot (`9a`).
    Authentication = 0x9A,

    /// Digital Signature slot (`9c`).
    ///
    /// Intended for document signing; the PIN is checked for every use.
    Signature = 0x9C,

    /// Key Management slot (`9d`).
    KeyManagement = 0x9D,

    /// Card Authentication slot (`9e`).
    CardAuthentication = 0x9E,
}

impl Slot {
    /// The slot holding the `did:plc` rotation key.
    pub const SIGNING: Self = Self::Signature;

    /// Returns the slot ID byte as used in PIV APDU commands.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Returns a human-readable name for the slot.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Authentication => "Authentication (9a)",
            Self::Signature => "Digital Signature (9c)",
            Self::KeyManagement => "Key Management (9d)",
            Self::CardAuthentication => "Card Authentication (9e)",
        }
    }

    /// Creates a slot from its ID byte.
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0x9A => Some(Self::Authentication),
            0x9C => Some(Self::Signature),
            0x9D => Some(Self::KeyManagement),
            0x9E => Some(Self::CardAuthentication),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When the card asks for the PIN before using a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PinPolicy {
    /// The applet default for the slot.
    Default = 0x00,
    /// Never.
    Never = 0x01,
    /// Once per session.
    Once = 0x02,
    /// Before every private key operation.
    Always = 0x03,
}

/// When the card asks for a touch before using a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TouchPolicy {
    /// The applet default for the slot.
    Default = 0x00,
    /// Never.
    Never = 0x01,
    /// For every private key operation.
    Always = 0x02,
    /// At most once every 15 seconds.
    Cached = 0x03,
}

/// PIN and touch policy attached to a key when it is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPolicy {
    /// PIN policy.
    pub pin: PinPolicy,
    /// Touch policy.
    pub touch: TouchPolicy,
}

impl KeyPolicy {
    /// PIN and touch for every signature.
    pub const STRICT: Self = Self {
        pin: PinPolicy::Always,
        touch: TouchPolicy::Always,
    };
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self::STRICT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_id() {
        assert_eq!(Slot::Authentication.id(), 0x9A);
        assert_eq!(Slot::Signature.id(), 0x9C);
        assert_eq!(Slot::KeyManagement.id(), 0x9D);
        assert_eq!(Slot::CardAuthentication.id(), 0x9E);
    }

    #[test]
    fn slot_from_id() {
        assert_eq!(Slot::from_id(0x9C), Some(Slot::SIGNING));
        assert_eq!(Slot::from_id(0xFF), None);
    }

    #[test]
    fn slot_display() {
        assert_eq!(format!("{}", Slot::Authentication), "Authentication (9a)");
    }

    #[test]
    fn strict_policy_bytes() {
        let policy = KeyPolicy::default();
        assert_eq!(policy.pin as u8, 0x03);
        assert_eq!(policy.touch as u8, 0x02);
    }
}
