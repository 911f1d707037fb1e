//! Queue of received but not-yet-attributed file descriptors.
//!
//! Descriptors arrive as ancillary data on socket reads and are not tied
//! 1:1 to any particular read call. They sit in this FIFO queue until a
//! completed frame claims the count its header declares, or a framing
//! failure closes everything still queued.

use std::collections::VecDeque;
use std::os::fd::OwnedFd;

/// Ordered queue of descriptors awaiting attribution to a frame.
///
/// The queue exclusively owns its entries: [`FdQueue::detach`] transfers
/// ownership to the caller, [`FdQueue::close_all`] releases them to the
/// operating system.
#[derive(Debug, Default)]
pub struct FdQueue {
    fds: VecDeque<OwnedFd>,
}

impl FdQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append descriptors received alongside a read, in arrival order.
    pub fn push(&mut self, fds: Vec<OwnedFd>) {
        self.fds.extend(fds);
    }

    /// Number of queued descriptors.
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Detach the first `count` descriptors, FIFO.
    ///
    /// Callers must check [`FdQueue::len`] first; a shortfall is a protocol
    /// violation diagnosed by the frame reader, not here.
    pub fn detach(&mut self, count: usize) -> Vec<OwnedFd> {
        debug_assert!(count <= self.fds.len());
        self.fds.drain(..count).collect()
    }

    /// Close every queued descriptor.
    ///
    /// Used on framing failure so descriptors attributable to a
    /// never-completed frame do not leak. Close errors are unreportable
    /// from `Drop` and are ignored; this only runs while unwinding a
    /// primary error anyway.
    pub fn close_all(&mut self) {
        self.fds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::{fcntl, FcntlArg};
    use std::os::fd::AsRawFd;

    fn make_fd() -> OwnedFd {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        read_end
    }

    #[test]
    fn test_detach_is_fifo() {
        let mut queue = FdQueue::new();
        let fds: Vec<OwnedFd> = (0..3).map(|_| make_fd()).collect();
        let raw: Vec<i32> = fds.iter().map(|fd| fd.as_raw_fd()).collect();
        queue.push(fds);

        let first_two = queue.detach(2);
        assert_eq!(first_two[0].as_raw_fd(), raw[0]);
        assert_eq!(first_two[1].as_raw_fd(), raw[1]);
        assert_eq!(queue.len(), 1);

        let last = queue.detach(1);
        assert_eq!(last[0].as_raw_fd(), raw[2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_detach_zero_leaves_queue_untouched() {
        let mut queue = FdQueue::new();
        queue.push(vec![make_fd()]);

        assert!(queue.detach(0).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_close_all_closes_descriptors() {
        let mut queue = FdQueue::new();
        let fd = make_fd();
        let raw = fd.as_raw_fd();
        queue.push(vec![fd]);

        queue.close_all();
        assert!(queue.is_empty());

        // The raw fd must no longer be valid.
        assert!(fcntl(raw, FcntlArg::F_GETFD).is_err());
    }
}
