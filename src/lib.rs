//! # buswire
//!
//! Client transport layer for D-Bus-style message buses: it turns a unix
//! domain socket into a reliable channel for discrete, length-prefixed
//! binary messages that may carry out-of-band file descriptors, and runs
//! the SASL handshake that authenticates the connection before any
//! message traffic begins.
//!
//! ## Architecture
//!
//! - **Transport** (`transport`): byte channel over a unix socket, with
//!   SCM_RIGHTS descriptor transfer on reads
//! - **Handshake** (`auth`): line-based mechanism negotiation
//!   (`AUTH EXTERNAL` then `AUTH ANONYMOUS`), descriptor-passing
//!   capability negotiation, `BEGIN`
//! - **Framing** (`protocol`): 16-byte primary header, 8-byte-aligned
//!   extended header, body, and descriptor reconciliation
//!
//! Message *contents* stay opaque: extended-header decoding is delegated
//! to a [`HeaderDecoder`] implementation, and bodies pass through
//! untouched.
//!
//! ## Example
//!
//! ```ignore
//! use buswire::{ConnectOptions, Connection};
//!
//! #[tokio::main]
//! async fn main() -> buswire::Result<()> {
//!     let mut conn = Connection::connect(
//!         "/run/user/1000/bus",
//!         MyHeaderDecoder,
//!         ConnectOptions::new().negotiate_unix_fds(true),
//!     )
//!     .await?;
//!
//!     while let Some(frame) = conn.receive().await? {
//!         println!("serial {} with {} fds", frame.serial(), frame.fds().len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod error;
pub mod protocol;
pub mod transport;

mod connection;

pub use auth::{Guid, Handshake};
pub use connection::{ConnectOptions, Connection};
pub use error::{BuswireError, Result};
pub use protocol::{FieldSummary, Frame, FrameReader, HeaderDecoder};
pub use transport::ByteChannel;

#[cfg(unix)]
pub use transport::SocketChannel;
