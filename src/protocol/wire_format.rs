//! Wire format for the fixed 16-byte primary header.
//!
//! Every message starts with a primary header:
//!
//! ```text
//! ┌────────┬──────┬───────┬─────────┬──────────┬──────────┬────────────┐
//! │ Endian │ Type │ Flags │ Version │ Body len │ Serial   │ Fields len │
//! │ 1 byte │ 1 B  │ 1 B   │ 1 byte  │ u32      │ u32      │ u32        │
//! └────────┴──────┴───────┴─────────┴──────────┴──────────┴────────────┘
//! ```
//!
//! Multi-byte integers honor the endianness tag in byte 0 (`l` = little,
//! `B` = big). The extended header (the "fields" segment) directly follows,
//! padded to an 8-byte boundary, then the body. Only the scalars needed to
//! size a frame are decoded here; field contents stay an opaque blob.

use crate::error::{BuswireError, Result};

/// Primary header size in bytes (fixed, exactly 16).
pub const PRIMARY_HEADER_SIZE: usize = 16;

/// The single supported protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum total message length: padded extended header plus body (128 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 134_217_728;

/// Endianness tag byte for little-endian messages.
pub const LITTLE_ENDIAN_TAG: u8 = b'l';

/// Endianness tag byte for big-endian messages.
pub const BIG_ENDIAN_TAG: u8 = b'B';

/// Round a byte count up to the next multiple of 8.
///
/// The extended header is padded to an 8-byte boundary before the body.
/// Widens to u64 so a declared length near `u32::MAX` cannot overflow.
///
/// # Example
///
/// ```
/// use buswire::protocol::pad8;
///
/// assert_eq!(pad8(0), 0);
/// assert_eq!(pad8(1), 8);
/// assert_eq!(pad8(8), 8);
/// assert_eq!(pad8(9), 16);
/// ```
#[inline]
pub fn pad8(n: u32) -> u64 {
    (u64::from(n) + 7) & !7
}

/// Byte order of a message, as declared by the header's tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Tag byte `l`.
    Little,
    /// Tag byte `B`.
    Big,
}

impl Endianness {
    /// Decode the tag byte. Returns `None` for an unknown tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            LITTLE_ENDIAN_TAG => Some(Self::Little),
            BIG_ENDIAN_TAG => Some(Self::Big),
            _ => None,
        }
    }

    /// The wire tag byte for this byte order.
    pub fn tag(self) -> u8 {
        match self {
            Self::Little => LITTLE_ENDIAN_TAG,
            Self::Big => BIG_ENDIAN_TAG,
        }
    }

    /// Read a u32 from four wire bytes in this byte order.
    #[inline]
    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }

    /// Write a u32 to four wire bytes in this byte order.
    #[inline]
    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

/// Decoded primary header.
///
/// `message_type`, `flags` and `serial` are carried for the caller but not
/// interpreted by this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryHeader {
    /// Byte order of every multi-byte field in this message.
    pub endianness: Endianness,
    /// Message type byte (opaque to the transport).
    pub message_type: u8,
    /// Flags byte (opaque to the transport).
    pub flags: u8,
    /// Protocol version (must equal [`PROTOCOL_VERSION`]).
    pub version: u8,
    /// Body length in bytes.
    pub body_len: u32,
    /// Message serial (opaque to the transport).
    pub serial: u32,
    /// Extended header fields length in bytes, unpadded.
    pub fields_len: u32,
}

impl PrimaryHeader {
    /// Decode the fixed primary header.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation for an unknown endianness tag and
    /// [`BuswireError::UnsupportedVersion`] for any version other than
    /// [`PROTOCOL_VERSION`].
    pub fn decode(buf: &[u8; PRIMARY_HEADER_SIZE]) -> Result<Self> {
        let endianness = Endianness::from_tag(buf[0]).ok_or_else(|| {
            BuswireError::Protocol(format!("unknown endianness tag 0x{:02x}", buf[0]))
        })?;

        let version = buf[3];
        if version != PROTOCOL_VERSION {
            return Err(BuswireError::UnsupportedVersion(version));
        }

        Ok(Self {
            endianness,
            message_type: buf[1],
            flags: buf[2],
            version,
            body_len: endianness.read_u32([buf[4], buf[5], buf[6], buf[7]]),
            serial: endianness.read_u32([buf[8], buf[9], buf[10], buf[11]]),
            fields_len: endianness.read_u32([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Encode the primary header to its 16 wire bytes.
    pub fn encode(&self) -> [u8; PRIMARY_HEADER_SIZE] {
        let mut buf = [0u8; PRIMARY_HEADER_SIZE];
        buf[0] = self.endianness.tag();
        buf[1] = self.message_type;
        buf[2] = self.flags;
        buf[3] = self.version;
        buf[4..8].copy_from_slice(&self.endianness.write_u32(self.body_len));
        buf[8..12].copy_from_slice(&self.endianness.write_u32(self.serial));
        buf[12..16].copy_from_slice(&self.endianness.write_u32(self.fields_len));
        buf
    }

    /// Number of bytes following the primary header: padded extended
    /// header plus body.
    #[inline]
    pub fn remaining_len(&self) -> u64 {
        pad8(self.fields_len) + u64::from(self.body_len)
    }
}
