//! Error types for buswire.

use thiserror::Error;

/// Main error type for all buswire operations.
#[derive(Debug, Error)]
pub enum BuswireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation (malformed reply line, length mismatch,
    /// descriptor shortfall, oversized message). Always fatal to the
    /// current channel.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Authentication failure (all mechanisms rejected, or the server
    /// guid did not match the expected one).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The peer advertised a protocol version this crate does not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Connection closed where more data was required.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using BuswireError.
pub type Result<T> = std::result::Result<T, BuswireError>;
