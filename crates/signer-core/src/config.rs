//! Runtime configuration.
//!
//! Everything here is independent of the slot, which is fixed to `9c`. The
//! CLI fills a [`Config`] from flags and environment variables; unset values
//! fall back to the YubiKey factory defaults.
//!
//! Using the factory PIN or management key is a known weakness: anyone with
//! the device can use them. A warning is logged whenever a default is used.

use core::fmt;
use core::str::FromStr;

use tracing::warn;

use crate::did_key::PointEncoding;
use crate::error::{Error, Result};

/// Factory default PIV PIN.
pub const DEFAULT_PIN: &str = "123456";

/// Factory default PIV management key (3DES).
pub const DEFAULT_MANAGEMENT_KEY: [u8; 24] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
];

/// A PIV PIN. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    /// Validates and wraps a PIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] unless the PIN is 6 to 8 ASCII
    /// characters.
    pub fn new(pin: impl Into<String>) -> Result<Self> {
        let pin = pin.into();
        if !(6..=8).contains(&pin.len()) || !pin.is_ascii() {
            return Err(Error::InvalidConfig(
                "PIN must be 6 to 8 ASCII characters".into(),
            ));
        }
        Ok(Self(pin))
    }

    /// Returns the PIN text for the VERIFY command.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Checks whether this is the factory default PIN.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_PIN
    }
}

impl Default for Pin {
    fn default() -> Self {
        Self(DEFAULT_PIN.to_string())
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(<redacted>)")
    }
}

impl FromStr for Pin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A 24-byte 3DES PIV management key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagementKey([u8; 24]);

impl ManagementKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn new(key: [u8; 24]) -> Self {
        Self(key)
    }

    /// Returns the key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }

    /// Checks whether this is the factory default key.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_MANAGEMENT_KEY
    }
}

impl Default for ManagementKey {
    fn default() -> Self {
        Self(DEFAULT_MANAGEMENT_KEY)
    }
}

impl fmt::Debug for ManagementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ManagementKey(<redacted>)")
    }
}

impl FromStr for ManagementKey {
    type Err = Error;

    /// Parses 48 hex characters.
    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())?;
        let key: [u8; 24] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            Error::InvalidConfig(format!(
                "management key must be 24 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }
}

/// Which connected reader to use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Use the single connected YubiKey; fail if there are several.
    #[default]
    Only,
    /// Use the reader at this position in the reader list.
    Index(usize),
    /// Use the reader whose name contains this text (case-insensitive).
    Name(String),
}

impl DeviceSelector {
    /// Picks a reader from `readers` by this selector.
    ///
    /// With [`DeviceSelector::Only`], readers whose name does not mention a
    /// YubiKey are ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] if nothing matches.
    /// - [`Error::AmbiguousDevice`] if more than one reader matches.
    pub fn select<'a>(&self, readers: &'a [String]) -> Result<&'a str> {
        let matching: Vec<&String> = match self {
            Self::Only => readers
                .iter()
                .filter(|name| contains_ignore_case(name, "yubikey"))
                .collect(),
            Self::Index(index) => readers.get(*index).into_iter().collect(),
            Self::Name(needle) => readers
                .iter()
                .filter(|name| contains_ignore_case(name, needle))
                .collect(),
        };

        match matching.as_slice() {
            [] => Err(Error::DeviceNotFound),
            [one] => Ok(one.as_str()),
            many => Err(Error::AmbiguousDevice(
                many.iter().map(|name| (*name).clone()).collect(),
            )),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Settings for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// PIN used to unlock signing.
    pub pin: Pin,
    /// Management key used to authorize key generation.
    pub management_key: ManagementKey,
    /// Reader selection.
    pub selector: DeviceSelector,
    /// Point form used when rendering the `did:key`.
    pub point_encoding: PointEncoding,
    /// Fold signatures into low-S form before emitting them.
    pub normalize_s: bool,
}

impl Default for Config {
    /// Factory credentials, the only YubiKey, uncompressed points and low-S
    /// normalization on.
    fn default() -> Self {
        Self {
            pin: Pin::default(),
            management_key: ManagementKey::default(),
            selector: DeviceSelector::Only,
            point_encoding: PointEncoding::Uncompressed,
            normalize_s: true,
        }
    }
}

impl Config {
    /// Logs a warning for every factory default credential in use.
    pub fn warn_on_defaults(&self) {
        if self.pin.is_default() {
            warn!("using the factory default PIN");
        }
        if self.management_key.is_default() {
            warn!("using the factory default management key");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readers(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn pin_is_redacted() {
        let pin = Pin::new("87654321").unwrap();
        let debug = format!("{pin:?}");
        assert!(!debug.contains("8765"));
        assert_eq!(pin.expose(), "87654321");
    }

    #[test]
    fn pin_length_is_checked() {
        assert!(Pin::new("12345").is_err());
        assert!(Pin::new("123456789").is_err());
        assert!(Pin::new("123456").unwrap().is_default());
    }

    #[test]
    fn management_key_from_hex() {
        let key: ManagementKey = "010203040506070801020304050607080102030405060708"
            .parse()
            .unwrap();
        assert!(key.is_default());
        assert!(!format!("{key:?}").contains("0102"));

        assert!(matches!(
            "0102".parse::<ManagementKey>(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            "zz".repeat(24).parse::<ManagementKey>(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn default_config_enables_low_s() {
        let config = Config::default();
        assert!(config.normalize_s);
        assert_eq!(config.selector, DeviceSelector::Only);
        assert_eq!(config.point_encoding, PointEncoding::Uncompressed);
    }

    #[test]
    fn selector_only_ignores_other_readers() {
        let names = readers(&["Alcor Micro AU9540", "Yubico YubiKey OTP+FIDO+CCID"]);
        assert_eq!(
            DeviceSelector::Only.select(&names).unwrap(),
            "Yubico YubiKey OTP+FIDO+CCID"
        );
    }

    #[test]
    fn selector_only_rejects_ambiguity() {
        let names = readers(&["Yubico YubiKey CCID 00", "Yubico YubiKey CCID 01"]);
        let err = DeviceSelector::Only.select(&names).unwrap_err();
        assert!(matches!(err, Error::AmbiguousDevice(ref list) if list.len() == 2));
    }

    #[test]
    fn selector_none_found() {
        assert!(matches!(
            DeviceSelector::Only.select(&[]),
            Err(Error::DeviceNotFound)
        ));
        assert!(matches!(
            DeviceSelector::Index(3).select(&readers(&["a"])),
            Err(Error::DeviceNotFound)
        ));
    }

    #[test]
    fn selector_by_index_and_name() {
        let names = readers(&["Yubico YubiKey CCID 00", "Yubico YubiKey CCID 01"]);
        assert_eq!(
            DeviceSelector::Index(1).select(&names).unwrap(),
            "Yubico YubiKey CCID 01"
        );
        assert_eq!(
            DeviceSelector::Name("ccid 00".into()).select(&names).unwrap(),
            "Yubico YubiKey CCID 00"
        );
    }
}
