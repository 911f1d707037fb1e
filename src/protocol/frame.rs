//! Frame struct with typed accessors.
//!
//! A frame is one complete protocol message: the 16-byte primary header,
//! the extended header padded to an 8-byte boundary, the body, and any
//! file descriptors the header attributed to it. Frames are built
//! incrementally by the frame reader and handed out as immutable units.

use std::os::fd::OwnedFd;

use bytes::Bytes;

use super::wire_format::{Endianness, PrimaryHeader};

/// A complete received message.
#[derive(Debug)]
pub struct Frame {
    /// Decoded primary header scalars.
    pub primary: PrimaryHeader,
    /// Raw header blob: primary 16 bytes plus the padded extended header.
    pub header: Bytes,
    /// Body bytes (may be empty).
    pub body: Bytes,
    /// Descriptors attributed to this frame, in arrival order.
    pub fds: Vec<OwnedFd>,
}

impl Frame {
    /// Byte order of every multi-byte field in this message.
    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.primary.endianness
    }

    /// Protocol version from the primary header.
    #[inline]
    pub fn version(&self) -> u8 {
        self.primary.version
    }

    /// Message type byte (not interpreted by this layer).
    #[inline]
    pub fn message_type(&self) -> u8 {
        self.primary.message_type
    }

    /// Flags byte (not interpreted by this layer).
    #[inline]
    pub fn flags(&self) -> u8 {
        self.primary.flags
    }

    /// Message serial (not interpreted by this layer).
    #[inline]
    pub fn serial(&self) -> u32 {
        self.primary.serial
    }

    /// Declared body length in bytes.
    #[inline]
    pub fn body_len(&self) -> u32 {
        self.primary.body_len
    }

    /// Declared extended-header length in bytes, unpadded.
    #[inline]
    pub fn fields_len(&self) -> u32 {
        self.primary.fields_len
    }

    /// Full header blob: primary header plus padded extended header.
    #[inline]
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Descriptors attributed to this frame.
    #[inline]
    pub fn fds(&self) -> &[OwnedFd] {
        &self.fds
    }

    /// Take ownership of the attributed descriptors.
    pub fn take_fds(&mut self) -> Vec<OwnedFd> {
        std::mem::take(&mut self.fds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::{PROTOCOL_VERSION, PRIMARY_HEADER_SIZE};

    #[test]
    fn test_frame_accessors() {
        let primary = PrimaryHeader {
            endianness: Endianness::Little,
            message_type: 1,
            flags: 2,
            version: PROTOCOL_VERSION,
            body_len: 5,
            serial: 42,
            fields_len: 0,
        };
        let frame = Frame {
            primary,
            header: Bytes::copy_from_slice(&primary.encode()),
            body: Bytes::from_static(b"hello"),
            fds: Vec::new(),
        };

        assert_eq!(frame.endianness(), Endianness::Little);
        assert_eq!(frame.version(), PROTOCOL_VERSION);
        assert_eq!(frame.message_type(), 1);
        assert_eq!(frame.flags(), 2);
        assert_eq!(frame.serial(), 42);
        assert_eq!(frame.body_len(), 5);
        assert_eq!(frame.fields_len(), 0);
        assert_eq!(frame.header().len(), PRIMARY_HEADER_SIZE);
        assert_eq!(frame.body(), b"hello");
        assert!(frame.fds().is_empty());
    }

    #[test]
    fn test_take_fds_empties_frame() {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        let primary = PrimaryHeader {
            endianness: Endianness::Little,
            message_type: 1,
            flags: 0,
            version: PROTOCOL_VERSION,
            body_len: 0,
            serial: 1,
            fields_len: 0,
        };
        let mut frame = Frame {
            primary,
            header: Bytes::copy_from_slice(&primary.encode()),
            body: Bytes::new(),
            fds: vec![read_end],
        };

        let fds = frame.take_fds();
        assert_eq!(fds.len(), 1);
        assert!(frame.fds().is_empty());
    }
}
