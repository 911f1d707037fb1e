//! SASL authentication handshake.
//!
//! Before any binary traffic the client runs a line-oriented text
//! exchange: it tries `AUTH EXTERNAL <hex-identity>` (when an identity is
//! available) and falls back to `AUTH ANONYMOUS`. A server that accepts a
//! mechanism replies `OK <guid>`; `REJECTED` moves on to the next
//! mechanism. After acceptance the client may negotiate descriptor
//! passing with `NEGOTIATE_UNIX_FD`, then sends `BEGIN` to switch the
//! channel to framed messages.
//!
//! Reply lines are ASCII, CRLF-terminated, and read one byte at a time
//! through the same exact-read primitive the frame reader uses, so any
//! descriptors a misbehaving server sends during the handshake land in
//! the connection's descriptor queue instead of leaking.

use std::fmt;
use std::str::FromStr;

use crate::error::{BuswireError, Result};
use crate::protocol::fd_queue::FdQueue;
use crate::protocol::reader::read_exactly;
use crate::transport::ByteChannel;

/// Exact reply granting descriptor passing. Anything else means "not
/// granted" without failing the handshake.
const AGREE_UNIX_FD: &str = "AGREE_UNIX_FD";

/// Global unique id of a bus instance: 16 raw bytes, hex-encoded on the
/// wire as 32 digits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Guid([u8; 16]);

impl Guid {
    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for Guid {
    type Err = BuswireError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 16];
        if s.len() != 32 {
            return Err(BuswireError::Protocol(format!(
                "guid must be 32 hex digits, got {} characters",
                s.len()
            )));
        }
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| BuswireError::Protocol(format!("invalid guid {s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

/// Outcome of a successful handshake.
#[derive(Debug)]
pub struct Handshake {
    /// Server guid from the `OK` reply, if one was advertised.
    pub guid: Option<Guid>,
    /// Whether the server granted descriptor passing.
    pub unix_fd: bool,
}

/// One parsed server reply, tagged by command word.
#[derive(Debug)]
enum AuthReply {
    /// `OK <guid>` - mechanism accepted. Empty argument means the server
    /// advertises no guid.
    Ok(Option<Guid>),
    /// `REJECTED ...` - try the next mechanism.
    Rejected,
    /// Anything else; acknowledged with `ERROR` and treated as a
    /// mechanism failure.
    Other,
}

fn parse_reply(line: &str) -> Result<AuthReply> {
    let mut words = line.split(' ');
    let command = words.next().unwrap_or("");
    match command {
        "OK" => {
            let guid = match words.next() {
                None | Some("") => None,
                Some(arg) => Some(arg.parse()?),
            };
            if words.next().is_some() {
                return Err(BuswireError::Protocol(format!(
                    "unexpected trailing arguments in reply {line:?}"
                )));
            }
            Ok(AuthReply::Ok(guid))
        }
        "REJECTED" => Ok(AuthReply::Rejected),
        _ => Ok(AuthReply::Other),
    }
}

/// Mechanism command lines, in attempt order.
fn mechanisms(identity: Option<&[u8]>) -> Vec<String> {
    let mut commands = Vec::with_capacity(2);
    if let Some(identity) = identity {
        commands.push(format!("AUTH EXTERNAL {}", hex::encode(identity)));
    }
    commands.push("AUTH ANONYMOUS".to_string());
    commands
}

/// Run the handshake to completion.
///
/// `identity` is the caller's identity for the EXTERNAL mechanism (a uid
/// string on unix), hex-encoded on the wire. Descriptor negotiation only
/// happens when the channel requested the capability.
///
/// # Errors
///
/// [`BuswireError::Auth`] when every mechanism is rejected; protocol and
/// I/O errors propagate from line reading.
pub(crate) async fn authenticate<C: ByteChannel>(
    channel: &mut C,
    ledger: &mut FdQueue,
    identity: Option<&[u8]>,
) -> Result<Handshake> {
    for command in mechanisms(identity) {
        send_line(channel, &command).await?;

        match parse_reply(&read_line(channel, ledger).await?)? {
            AuthReply::Ok(guid) => {
                let mut unix_fd = false;
                if channel.supports_fd_passing() {
                    send_line(channel, "NEGOTIATE_UNIX_FD").await?;
                    let reply = read_line(channel, ledger).await?;
                    unix_fd = reply == AGREE_UNIX_FD;
                    tracing::debug!(granted = unix_fd, "descriptor passing negotiated");
                }
                send_line(channel, "BEGIN").await?;
                tracing::debug!(guid = ?guid, "authenticated");
                return Ok(Handshake { guid, unix_fd });
            }
            AuthReply::Rejected => {
                tracing::trace!(command = %command, "mechanism rejected");
            }
            AuthReply::Other => {
                send_line(channel, "ERROR").await?;
            }
        }
    }

    Err(BuswireError::Auth(
        "all authentication mechanisms were rejected".to_string(),
    ))
}

/// Write one command line, CRLF-terminated.
async fn send_line<C: ByteChannel>(channel: &mut C, line: &str) -> Result<()> {
    channel.send(format!("{line}\r\n").as_bytes()).await
}

/// Read one CRLF-terminated reply line.
///
/// A bare `\r` must be immediately followed by `\n`; an empty line is a
/// protocol violation, and end-of-stream before the terminator is an I/O
/// error.
async fn read_line<C: ByteChannel>(channel: &mut C, ledger: &mut FdQueue) -> Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = read_byte(channel, ledger).await?;
        if byte != b'\r' {
            line.push(byte);
            continue;
        }

        let next = read_byte(channel, ledger).await?;
        if next != b'\n' {
            return Err(BuswireError::Protocol(format!(
                "expected LF after CR in reply line, got 0x{next:02x}"
            )));
        }
        if line.is_empty() {
            return Err(BuswireError::Protocol(
                "empty authentication reply line".to_string(),
            ));
        }
        return String::from_utf8(line).ok().filter(|s| s.is_ascii()).ok_or_else(|| {
            BuswireError::Protocol("non-ASCII byte in authentication reply line".to_string())
        });
    }
}

async fn read_byte<C: ByteChannel>(channel: &mut C, ledger: &mut FdQueue) -> Result<u8> {
    let mut byte = [0u8; 1];
    if read_exactly(channel, ledger, &mut byte).await? == 0 {
        return Err(BuswireError::ConnectionClosed);
    }
    Ok(byte[0])
}
