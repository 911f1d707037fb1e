//! Unix domain socket channel with SCM_RIGHTS descriptor transfer.
//!
//! Reads go through `recvmsg` so ancillary descriptors arrive together
//! with the bytes they accompany. The socket stays registered with tokio;
//! each syscall runs inside a readiness-guarded `try_io` loop.

use std::io::{self, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::errno::Errno;
use nix::sys::socket::{self, ControlMessageOwned, MsgFlags};
use tokio::io::Interest;
use tokio::net::UnixStream;

use crate::error::Result;

use super::ByteChannel;

/// Ancillary capacity per read, in descriptors. SCM_RIGHTS batches larger
/// than this are truncated by the kernel at the control-buffer boundary.
pub const MAX_FDS_PER_READ: usize = 16;

/// Connected unix domain socket channel.
#[derive(Debug)]
pub struct SocketChannel {
    stream: UnixStream,
    fd_passing: bool,
}

impl SocketChannel {
    /// Connect to a socket path.
    ///
    /// `fd_passing` records whether the caller wants to attempt
    /// descriptor passing on this channel; unix sockets always carry
    /// ancillary data, so the flag is forwarded as-is for the
    /// authenticator to negotiate.
    pub async fn connect(path: impl AsRef<Path>, fd_passing: bool) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream, fd_passing })
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream, fd_passing: bool) -> Self {
        Self { stream, fd_passing }
    }
}

impl ByteChannel for SocketChannel {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<(usize, Vec<OwnedFd>)> {
        loop {
            self.stream.readable().await?;

            let fd = self.stream.as_raw_fd();
            match self
                .stream
                .try_io(Interest::READABLE, || recv_with_fds(fd, buf))
            {
                Ok(result) => return Ok(result),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn send(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            self.stream.writable().await?;

            match self.stream.try_write(bytes) {
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn supports_fd_passing(&self) -> bool {
        self.fd_passing
    }
}

/// Receive bytes plus any SCM_RIGHTS descriptors in one recvmsg call.
fn recv_with_fds(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Vec<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let mut cmsg_buf = nix::cmsg_space!([RawFd; MAX_FDS_PER_READ]);

    let (bytes, fds) = {
        let msg = socket::recvmsg::<()>(
            fd,
            &mut iov,
            Some(&mut cmsg_buf),
            MsgFlags::MSG_CMSG_CLOEXEC,
        )
        .map_err(nix_to_io)?;

        let mut fds = Vec::new();
        for cmsg in msg.cmsgs().map_err(nix_to_io)? {
            if let ControlMessageOwned::ScmRights(raw) = cmsg {
                // recvmsg transferred ownership of these descriptors to us.
                fds.extend(raw.into_iter().map(|fd| unsafe { OwnedFd::from_raw_fd(fd) }));
            }
        }
        (msg.bytes, fds)
    };

    Ok((bytes, fds))
}

fn nix_to_io(errno: Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_recv_bytes() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut left = SocketChannel::from_stream(a, false);
        let mut right = SocketChannel::from_stream(b, false);

        left.send(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, fds) = right.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(fds.is_empty());
    }

    #[tokio::test]
    async fn test_recv_zero_on_peer_close() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut right = SocketChannel::from_stream(b, false);
        drop(a);

        let mut buf = [0u8; 16];
        let (n, fds) = right.recv(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(fds.is_empty());
    }

    #[tokio::test]
    async fn test_recv_collects_scm_rights() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut right = SocketChannel::from_stream(b, true);

        let (pipe_read, _pipe_write) = nix::unistd::pipe().unwrap();

        // Send one byte with a descriptor attached from a blocking socket.
        let a_std = a.into_std().unwrap();
        a_std.set_nonblocking(false).unwrap();
        let iov = [std::io::IoSlice::new(b"x")];
        let send_fds = [pipe_read.as_raw_fd()];
        let cmsg = [socket::ControlMessage::ScmRights(&send_fds)];
        socket::sendmsg::<()>(a_std.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None).unwrap();

        let mut buf = [0u8; 4];
        let (n, fds) = right.recv(&mut buf).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], b'x');
        assert_eq!(fds.len(), 1);
        assert!(right.supports_fd_passing());
    }
}
