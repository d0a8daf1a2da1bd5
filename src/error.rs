//! Error types.
//!
//! The reader surfaces exactly one kind of failure to its owner: a terminal
//! transport read error carrying the platform error code. End-of-stream is
//! not an error (it is delivered through the data channel as an empty view),
//! and would-block conditions never construct a [`TransportError`]; they
//! mean "no data yet, stay armed and wait".

use std::io;

/// A terminal transport read failure.
///
/// Carries the platform error code (`errno` on Unix) so consumers can
/// distinguish failure classes without string matching. Delivered at most
/// once per reader, through the error callback, and never for end-of-stream.
#[derive(Debug, thiserror::Error)]
#[error("transport read failed: {source}")]
pub struct TransportError {
    code: i32,
    #[source]
    source: io::Error,
}

impl TransportError {
    /// Wraps a failed read.
    ///
    /// `source` must be a genuine failure; would-block and interrupted
    /// conditions are handled before this point.
    #[must_use]
    pub fn from_io(source: io::Error) -> Self {
        debug_assert!(!matches!(
            source.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        ));
        Self {
            code: source.raw_os_error().unwrap_or(0),
            source,
        }
    }

    /// Returns the platform error code, or `0` if the underlying error did
    /// not originate from the operating system.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Returns the [`io::ErrorKind`] of the underlying error.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}
