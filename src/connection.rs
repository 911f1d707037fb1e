//! Connection establisher and the ready-to-use message channel.
//!
//! [`Connection::connect`] manages the lifecycle:
//! 1. Open the socket channel (capability flag forwarded)
//! 2. Send the mandatory leading NUL byte
//! 3. Run the SASL handshake
//! 4. Compare the server guid against an expected one, if supplied
//!
//! Any failure along the way drops the partially-open channel; no
//! half-established connection is ever handed back. After that the
//! connection carries framed binary messages until it is dropped.
//! Dropping closes the socket; descriptors queued behind a failed frame
//! are closed by the frame reader's own error path.

use std::path::Path;

use crate::auth::{self, Guid, Handshake};
use crate::error::{BuswireError, Result};
use crate::protocol::{Frame, FrameReader, HeaderDecoder};
use crate::transport::{ByteChannel, SocketChannel};

/// Options for establishing a connection.
///
/// # Example
///
/// ```
/// use buswire::ConnectOptions;
///
/// let opts = ConnectOptions::new().negotiate_unix_fds(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    negotiate_unix_fds: bool,
    expected_guid: Option<Guid>,
    identity: Option<Vec<u8>>,
}

impl ConnectOptions {
    /// Default options: no descriptor passing, no expected guid, identity
    /// taken from the effective uid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt descriptor-passing negotiation during the handshake.
    pub fn negotiate_unix_fds(mut self, negotiate: bool) -> Self {
        self.negotiate_unix_fds = negotiate;
        self
    }

    /// Require the server to advertise this guid. A mismatch (or a server
    /// that advertises none) fails the connection attempt.
    pub fn expected_guid(mut self, guid: Guid) -> Self {
        self.expected_guid = Some(guid);
        self
    }

    /// Override the identity sent with `AUTH EXTERNAL`. The default is
    /// the effective uid as a decimal string.
    pub fn identity(mut self, identity: impl Into<Vec<u8>>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

/// An authenticated message channel.
///
/// One receive and one send may be in flight at a time; the `&mut self`
/// receivers make two concurrent receives on the same connection a
/// compile error rather than a data race on the descriptor queue.
#[derive(Debug)]
pub struct Connection<C, D> {
    channel: C,
    reader: FrameReader,
    decoder: D,
    guid: Option<Guid>,
    unix_fd: bool,
}

impl<D: HeaderDecoder> Connection<SocketChannel, D> {
    /// Connect to a bus socket path and authenticate.
    pub async fn connect(
        path: impl AsRef<Path>,
        decoder: D,
        options: ConnectOptions,
    ) -> Result<Self> {
        let channel = SocketChannel::connect(path, options.negotiate_unix_fds).await?;
        Self::establish(channel, decoder, options).await
    }
}

impl<C: ByteChannel, D: HeaderDecoder> Connection<C, D> {
    /// Authenticate over an already-open channel.
    ///
    /// On any error the channel is dropped here, closing it.
    pub async fn establish(mut channel: C, decoder: D, options: ConnectOptions) -> Result<Self> {
        let mut reader = FrameReader::new();

        // Mandatory protocol preamble before any authentication text.
        channel.send(&[0]).await?;

        let identity = options.identity.or_else(default_identity);
        let Handshake { guid, unix_fd } =
            auth::authenticate(&mut channel, reader.ledger_mut(), identity.as_deref()).await?;

        if let Some(expected) = options.expected_guid {
            match guid {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(BuswireError::Auth(format!(
                        "server guid {actual} does not match expected {expected}"
                    )));
                }
                None => {
                    return Err(BuswireError::Auth(format!(
                        "server advertised no guid, expected {expected}"
                    )));
                }
            }
        }

        tracing::debug!(guid = ?guid, unix_fd, "connection established");
        Ok(Self {
            channel,
            reader,
            decoder,
            guid,
            unix_fd,
        })
    }

    /// Receive one complete frame, or `None` when the peer closed the
    /// stream cleanly between frames.
    pub async fn receive(&mut self) -> Result<Option<Frame>> {
        self.reader.read_frame(&mut self.channel, &self.decoder).await
    }

    /// Send a fully-encoded outbound message.
    ///
    /// The message is already framed by the encoding component; this is a
    /// pass-through to the channel's write.
    pub async fn send(&mut self, message: &[u8]) -> Result<()> {
        self.channel.send(message).await
    }

    /// The server guid advertised during authentication, if any.
    pub fn server_guid(&self) -> Option<&Guid> {
        self.guid.as_ref()
    }

    /// Whether the server granted descriptor passing.
    pub fn unix_fd_granted(&self) -> bool {
        self.unix_fd
    }
}

/// Effective uid as a decimal string, the EXTERNAL mechanism's identity.
fn default_identity() -> Option<Vec<u8>> {
    #[cfg(unix)]
    {
        Some(nix::unistd::geteuid().as_raw().to_string().into_bytes())
    }
    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FieldSummary;
    use crate::transport::mock::MockChannel;

    const GUID_HEX: &str = "0102030405060708090a0b0c0d0e0f10";

    #[derive(Debug)]
    struct NoFdsDecoder;

    impl HeaderDecoder for NoFdsDecoder {
        fn decode(&self, _header: &[u8]) -> Result<FieldSummary> {
            Ok(FieldSummary { unix_fds: 0 })
        }
    }

    #[tokio::test]
    async fn test_establish_sends_leading_nul_first() {
        let mut channel = MockChannel::new(false);
        channel.read_line(&format!("OK {GUID_HEX}"));

        let conn = Connection::establish(channel, NoFdsDecoder, ConnectOptions::new())
            .await
            .unwrap();

        assert_eq!(conn.channel.written[0], 0);
        assert_eq!(conn.server_guid().unwrap().to_string(), GUID_HEX);
        assert!(!conn.unix_fd_granted());
    }

    #[tokio::test]
    async fn test_expected_guid_match() {
        let mut channel = MockChannel::new(false);
        channel.read_line(&format!("OK {GUID_HEX}"));

        let options = ConnectOptions::new().expected_guid(GUID_HEX.parse().unwrap());
        let conn = Connection::establish(channel, NoFdsDecoder, options).await;
        assert!(conn.is_ok());
    }

    #[tokio::test]
    async fn test_expected_guid_mismatch_is_auth_error() {
        let mut channel = MockChannel::new(false);
        channel.read_line(&format!("OK {GUID_HEX}"));

        let other: Guid = "ffffffffffffffffffffffffffffffff".parse().unwrap();
        let options = ConnectOptions::new().expected_guid(other);
        let err = Connection::establish(channel, NoFdsDecoder, options)
            .await
            .unwrap_err();
        assert!(matches!(err, BuswireError::Auth(_)));
    }

    #[tokio::test]
    async fn test_expected_guid_but_server_has_none() {
        let mut channel = MockChannel::new(false);
        channel.read_line("OK");

        let options = ConnectOptions::new().expected_guid(GUID_HEX.parse().unwrap());
        let err = Connection::establish(channel, NoFdsDecoder, options)
            .await
            .unwrap_err();
        assert!(matches!(err, BuswireError::Auth(_)));
    }

    #[tokio::test]
    async fn test_send_is_passthrough() {
        let mut channel = MockChannel::new(false);
        channel.read_line("OK");

        let mut conn = Connection::establish(channel, NoFdsDecoder, ConnectOptions::new())
            .await
            .unwrap();
        let before = conn.channel.written.len();
        conn.send(b"encoded message bytes").await.unwrap();
        assert_eq!(&conn.channel.written[before..], b"encoded message bytes");
    }

    #[tokio::test]
    async fn test_receive_after_handshake() {
        use crate::protocol::{Endianness, PrimaryHeader, PROTOCOL_VERSION};

        let head = PrimaryHeader {
            endianness: Endianness::Little,
            message_type: 1,
            flags: 0,
            version: PROTOCOL_VERSION,
            body_len: 3,
            serial: 9,
            fields_len: 0,
        };
        let mut wire = head.encode().to_vec();
        wire.extend_from_slice(b"abc");

        let mut channel = MockChannel::new(false);
        channel.read_line("OK").read_chunk(&wire).read_eof();

        let mut conn = Connection::establish(channel, NoFdsDecoder, ConnectOptions::new())
            .await
            .unwrap();

        let frame = conn.receive().await.unwrap().unwrap();
        assert_eq!(frame.body(), b"abc");
        assert_eq!(frame.serial(), 9);

        assert!(conn.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_override_used_for_external() {
        let mut channel = MockChannel::new(false);
        channel.read_line("OK");

        let options = ConnectOptions::new().identity(b"4242".to_vec());
        let conn = Connection::establish(channel, NoFdsDecoder, options)
            .await
            .unwrap();

        let written = String::from_utf8(conn.channel.written.clone()).unwrap();
        assert!(written.contains(&format!("AUTH EXTERNAL {}", hex::encode(b"4242"))));
    }
}
