//! sink-transport - non-blocking transport primitives
//!
//! The sender performs exactly one non-blocking attempt per payload, so every
//! primitive here is a `try_*` operation that either completes immediately or
//! reports [`Error::WouldBlock`]. Only establishing a stream is asynchronous.
//!
//! # Architecture
//!
//! - [`DatagramBinder`] / [`DatagramSocket`]: connectionless delivery. A binder
//!   creates a socket suitable for a given destination; the socket sends one
//!   datagram per call.
//! - [`StreamConnector`] / [`StreamSocket`]: connection-oriented delivery. A
//!   connector establishes a stream to a destination; the stream accepts
//!   non-blocking writes.
//!
//! [`UdpBinder`] (non-blocking std sockets) and [`TcpConnector`] (tokio) are
//! the real implementations, tuned
//! through `socket2`. The [`mock`] module provides in-memory implementations
//! with failure injection for tests.

mod datagram;
pub mod error;
pub mod mock;
mod stream;

pub use datagram::{DatagramBinder, DatagramSocket, UdpBinder};
pub use error::{Error, Result};
pub use stream::{StreamConnector, StreamSocket, TcpConnector, DEFAULT_CONNECT_TIMEOUT};
