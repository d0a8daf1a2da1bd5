//! Transport abstraction and fd adapter.
//!
//! The reader pulls bytes through the [`Transport`] trait, a narrow seam
//! over a readable endpoint. Production code wraps a nonblocking socket or
//! pipe with [`FdTransport`]; tests substitute doubles that inject short
//! reads, errors, and end-of-stream deterministically (see
//! [`lab::LabPipe`](crate::lab::LabPipe)).
//!
//! # Read conventions
//!
//! `read` follows the POSIX conventions in their `io::Result` dress:
//!
//! - `Ok(n)` with `n > 0`: `n` bytes were read
//! - `Ok(0)`: end of stream
//! - `Err` with [`io::ErrorKind::WouldBlock`]: no data yet; the reader stays
//!   armed and waits for the next readiness notification
//! - any other `Err`: terminal failure; the platform code travels to the
//!   error callback via [`TransportError`](crate::error::TransportError)

use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, RawFd};

/// A readable endpoint the reader can drain.
///
/// `'static` because the reader retains its transport for its whole
/// lifetime and hands weak references to the reactor.
pub trait Transport: 'static {
    /// Performs one bounded read into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Returns the file descriptor the reactor should watch for this
    /// endpoint.
    fn raw_fd(&self) -> RawFd;
}

/// Adapter exposing any nonblocking `io::Read + AsRawFd` endpoint as a
/// [`Transport`].
///
/// The endpoint must already be in nonblocking mode; a blocking endpoint
/// would stall the loop thread inside `read`.
#[derive(Debug)]
pub struct FdTransport<R> {
    inner: R,
}

impl<R: Read + AsRawFd + 'static> FdTransport<R> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns a reference to the underlying endpoint.
    #[must_use]
    pub const fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consumes the adapter and returns the underlying endpoint.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + AsRawFd + 'static> Transport for FdTransport<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
