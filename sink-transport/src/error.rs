//! Error types for transport operations

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while sending through a transport
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The operation could not complete without blocking
    #[error("operation would block")]
    WouldBlock,

    /// Establishing a stream took longer than allowed
    #[error("connection to {0} timed out")]
    ConnectTimeout(SocketAddr),

    /// Only part of the payload was written to a stream
    #[error("short write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    /// The peer closed the stream
    #[error("connection closed by peer")]
    Closed,

    /// No stream is established yet
    #[error("not connected")]
    NotConnected,
}

impl Error {
    /// Convert an I/O error, keeping `WouldBlock` distinguishable
    pub fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::WouldBlock {
            Error::WouldBlock
        } else {
            Error::Io(err)
        }
    }

    /// Check if the error is transient and leaves the handle usable
    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_keeps_would_block() {
        let err = Error::from_io(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_would_block());

        let err = Error::from_io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_would_block());
    }

    #[test]
    fn test_partial_write_display() {
        let err = Error::PartialWrite {
            written: 3,
            expected: 10,
        };
        assert_eq!(err.to_string(), "short write: 3 of 10 bytes");
    }
}
