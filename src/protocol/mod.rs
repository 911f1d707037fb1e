//! Protocol module - wire format, framing, and descriptor accounting.
//!
//! This module implements the binary message protocol:
//! - 16-byte primary header encoding/decoding and the `pad8` alignment rule
//! - Frame reader with exact-count accumulation over partial reads
//! - FIFO queue of descriptors awaiting attribution to a frame

mod frame;
mod wire_format;

pub(crate) mod fd_queue;
pub(crate) mod reader;

pub use frame::Frame;
pub use reader::{FieldSummary, FrameReader, HeaderDecoder};
pub use wire_format::{
    pad8, Endianness, PrimaryHeader, BIG_ENDIAN_TAG, LITTLE_ENDIAN_TAG, MAX_MESSAGE_SIZE,
    PRIMARY_HEADER_SIZE, PROTOCOL_VERSION,
};
