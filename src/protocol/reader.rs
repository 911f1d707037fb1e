//! Frame reader - exact-count accumulation and frame assembly.
//!
//! The reader turns a stream of partial reads into whole frames:
//!
//! 1. Read exactly 16 bytes (primary header). Zero bytes on this first
//!    read is orderly end-of-stream; any other short count is a protocol
//!    violation.
//! 2. Decode the primary header and size the rest of the frame. A frame
//!    whose padded extended header plus body exceeds the maximum message
//!    size is rejected before any body allocation.
//! 3. Read the padded extended header, hand it to the [`HeaderDecoder`]
//!    for the declared descriptor count, then read the body.
//! 4. Reconcile the descriptor queue against the declared count and
//!    detach exactly that many, FIFO.
//!
//! On any failure the reader closes every descriptor still queued, so
//! descriptors attributable to a never-completed frame cannot leak.

use bytes::BytesMut;

use crate::error::{BuswireError, Result};
use crate::transport::ByteChannel;

use super::fd_queue::FdQueue;
use super::frame::Frame;
use super::wire_format::{pad8, PrimaryHeader, MAX_MESSAGE_SIZE, PRIMARY_HEADER_SIZE};

/// Extracted extended-header fields the transport needs.
///
/// Everything else in the extended header is opaque to this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSummary {
    /// Number of file descriptors the header attributes to this message.
    pub unix_fds: u32,
}

/// Extended-header decoding contract, consumed by the frame reader.
///
/// Implementations receive the full header blob (primary 16 bytes plus
/// the padded extended header) and extract the fields named in
/// [`FieldSummary`]. Full signature/type-system decoding lives outside
/// this crate.
pub trait HeaderDecoder {
    /// Decode the extended header from the full header blob.
    fn decode(&self, header: &[u8]) -> Result<FieldSummary>;
}

/// Read bytes until `buf` is full or the peer closes the stream.
///
/// Descriptors delivered alongside any read are pushed onto `ledger`;
/// they are not tied to a particular read call. Returns the number of
/// bytes accumulated: `buf.len()` on success, less than that when the
/// peer closed mid-buffer, and 0 when it closed before the first byte.
/// The caller decides which short counts are errors.
pub(crate) async fn read_exactly<C: ByteChannel>(
    channel: &mut C,
    ledger: &mut FdQueue,
    buf: &mut [u8],
) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let (n, fds) = channel.recv(&mut buf[filled..]).await?;
        ledger.push(fds);
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Assembles complete frames from a byte channel.
///
/// Owns the queue of not-yet-attributed descriptors. The `&mut self`
/// receiver on [`FrameReader::read_frame`] statically rules out two
/// concurrent receives on the same channel; the 16-byte primary-header
/// buffer is per-call.
#[derive(Debug, Default)]
pub struct FrameReader {
    ledger: FdQueue,
}

impl FrameReader {
    /// Create a reader with an empty descriptor queue.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut FdQueue {
        &mut self.ledger
    }

    /// Read one complete frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between
    /// frames (zero bytes on the very first header read).
    ///
    /// # Errors
    ///
    /// Any protocol violation or I/O failure is fatal to the channel;
    /// every descriptor still queued is closed before the error is
    /// returned.
    pub async fn read_frame<C, D>(&mut self, channel: &mut C, decoder: &D) -> Result<Option<Frame>>
    where
        C: ByteChannel,
        D: HeaderDecoder,
    {
        match self.read_frame_inner(channel, decoder).await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.ledger.close_all();
                Err(e)
            }
        }
    }

    async fn read_frame_inner<C, D>(
        &mut self,
        channel: &mut C,
        decoder: &D,
    ) -> Result<Option<Frame>>
    where
        C: ByteChannel,
        D: HeaderDecoder,
    {
        let mut primary = [0u8; PRIMARY_HEADER_SIZE];
        let n = read_exactly(channel, &mut self.ledger, &mut primary).await?;
        if n == 0 {
            return Ok(None);
        }
        if n < PRIMARY_HEADER_SIZE {
            return Err(BuswireError::Protocol(format!(
                "connection closed after {n} of {PRIMARY_HEADER_SIZE} header bytes"
            )));
        }

        let head = PrimaryHeader::decode(&primary)?;

        // Reject oversized frames before allocating anything.
        let fields_padded = pad8(head.fields_len);
        if head.remaining_len() > u64::from(MAX_MESSAGE_SIZE) {
            return Err(BuswireError::Protocol(format!(
                "message length {} exceeds maximum {}",
                head.remaining_len(),
                MAX_MESSAGE_SIZE
            )));
        }
        let fields_padded = fields_padded as usize;

        let mut header = BytesMut::zeroed(PRIMARY_HEADER_SIZE + fields_padded);
        header[..PRIMARY_HEADER_SIZE].copy_from_slice(&primary);
        let n = read_exactly(channel, &mut self.ledger, &mut header[PRIMARY_HEADER_SIZE..]).await?;
        if n < fields_padded {
            return Err(BuswireError::Protocol(format!(
                "connection closed after {n} of {fields_padded} extended header bytes"
            )));
        }

        let fields = decoder.decode(&header)?;

        let body = if head.body_len > 0 {
            let mut body = BytesMut::zeroed(head.body_len as usize);
            let n = read_exactly(channel, &mut self.ledger, &mut body).await?;
            if n < head.body_len as usize {
                return Err(BuswireError::Protocol(format!(
                    "connection closed after {n} of {} body bytes",
                    head.body_len
                )));
            }
            body.freeze()
        } else {
            bytes::Bytes::new()
        };

        // The peer must have delivered at least as many descriptors as the
        // header declares. Extras stay queued for a later frame.
        let declared = fields.unix_fds as usize;
        if self.ledger.len() < declared {
            return Err(BuswireError::Protocol(format!(
                "header declares {declared} file descriptors, received {}",
                self.ledger.len()
            )));
        }
        let fds = self.ledger.detach(declared);

        Ok(Some(Frame {
            primary: head,
            header: header.freeze(),
            body,
            fds,
        }))
    }
}
