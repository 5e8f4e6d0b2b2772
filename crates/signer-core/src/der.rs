//! Minimal DER/BER-TLV reader.
//!
//! Covers what this crate needs to read: ECDSA signatures, X.509 attestation
//! certificates and PIV response templates. Only definite lengths are
//! accepted; long-form lengths of up to two bytes must be minimal.
//!
//! Errors are plain messages; callers wrap them into the [`Error`] variant
//! that fits their context.
//!
//! [`Error`]: crate::Error

/// A cursor over a sequence of TLV elements.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DerReader<'a> {
    bytes: &'a [u8],
}

/// A decoded TLV element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tlv<'a> {
    /// The tag, one or two bytes (e.g. `0x30` or `0x7F49`).
    pub(crate) tag: u16,

    /// The value bytes.
    pub(crate) value: &'a [u8],
}

impl<'a> DerReader<'a> {
    pub(crate) const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Returns `true` once every element has been consumed.
    pub(crate) const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the tag of the next element without consuming it.
    pub(crate) fn peek_tag(&self) -> Option<u16> {
        let mut copy = *self;
        copy.read_tag().ok()
    }

    /// Reads the next element, whatever its tag.
    pub(crate) fn read_any(&mut self) -> Result<Tlv<'a>, &'static str> {
        let tag = self.read_tag()?;
        let len = self.read_len()?;
        if len > self.bytes.len() {
            return Err("length exceeds available data");
        }
        let (value, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(Tlv { tag, value })
    }

    /// Reads the next element and checks its tag.
    pub(crate) fn read(&mut self, tag: u16) -> Result<&'a [u8], &'static str> {
        let tlv = self.read_any()?;
        if tlv.tag == tag {
            Ok(tlv.value)
        } else {
            Err("unexpected tag")
        }
    }

    /// Skips elements until one with `tag` is found and returns its value.
    pub(crate) fn find(&mut self, tag: u16) -> Result<&'a [u8], &'static str> {
        while !self.is_empty() {
            let tlv = self.read_any()?;
            if tlv.tag == tag {
                return Ok(tlv.value);
            }
        }
        Err("tag not found")
    }

    fn next_byte(&mut self) -> Result<u8, &'static str> {
        let (&first, rest) = self.bytes.split_first().ok_or("unexpected end of data")?;
        self.bytes = rest;
        Ok(first)
    }

    fn read_tag(&mut self) -> Result<u16, &'static str> {
        let first = self.next_byte()?;
        // low five bits all set: the tag number continues in the next byte
        if first & 0x1F == 0x1F {
            let second = self.next_byte()?;
            Ok((u16::from(first) << 8) | u16::from(second))
        } else {
            Ok(u16::from(first))
        }
    }

    fn read_len(&mut self) -> Result<usize, &'static str> {
        match self.next_byte()? {
            short @ 0x00..=0x7F => Ok(usize::from(short)),
            0x81 => {
                let len = self.next_byte()?;
                if len < 0x80 {
                    return Err("non-minimal length");
                }
                Ok(usize::from(len))
            }
            0x82 => {
                let hi = self.next_byte()?;
                let lo = self.next_byte()?;
                let len = (usize::from(hi) << 8) | usize::from(lo);
                if len < 0x100 {
                    return Err("non-minimal length");
                }
                Ok(len)
            }
            0x80 => Err("indefinite length"),
            _ => Err("length too large"),
        }
    }
}

/// Appends a DER length to `out`.
pub(crate) fn write_len(out: &mut Vec<u8>, len: usize) {
    match len {
        0..=0x7F => out.push(len as u8),
        0x80..=0xFF => {
            out.push(0x81);
            out.push(len as u8);
        }
        _ => {
            out.push(0x82);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
    }
}
