//! Transport module - byte channels with descriptor passing.
//!
//! A [`ByteChannel`] is a bidirectional byte stream that can deliver unix
//! file descriptors as a side effect of a read. The frame reader and the
//! SASL authenticator are written against this trait; [`SocketChannel`]
//! is the unix domain socket implementation.

#[cfg(unix)]
mod socket;

#[cfg(unix)]
pub use socket::{SocketChannel, MAX_FDS_PER_READ};

use std::os::fd::OwnedFd;

use crate::error::Result;

/// Bidirectional byte stream with out-of-band descriptor transfer.
///
/// `recv` returning 0 bytes signals orderly peer close; the descriptor
/// vector is always the (possibly empty) set received alongside that read.
/// Writes either transfer the whole buffer or fail; there is no partial
/// success surfaced to callers.
pub trait ByteChannel {
    /// Read up to `buf.len()` bytes plus any descriptors delivered
    /// alongside them.
    fn recv(
        &mut self,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<(usize, Vec<OwnedFd>)>> + Send;

    /// Write the entire buffer.
    fn send(&mut self, bytes: &[u8]) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Whether descriptor passing was requested for this channel.
    fn supports_fd_passing(&self) -> bool;
}
