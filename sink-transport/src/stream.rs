//! Connection-oriented transport
//!
//! A [`StreamConnector`] establishes a stream asynchronously; once connected the
//! stream takes non-blocking writes through [`StreamSocket::try_write`].

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpSocket, TcpStream};

use crate::error::{Error, Result};

/// Default upper bound for establishing a TCP connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Established stream accepting non-blocking writes
pub trait StreamSocket {
    /// Write as much of `buf` as possible without blocking
    ///
    /// Returns the number of bytes written, or [`Error::WouldBlock`] when
    /// nothing could be written.
    fn try_write(&self, buf: &[u8]) -> Result<usize>;

    /// Address of the remote end
    fn peer_addr(&self) -> Result<SocketAddr>;
}

/// Establishes streams to destinations
///
/// Connection attempts run as local tasks on the sender's event loop, hence the
/// futures are not required to be `Send`.
#[async_trait(?Send)]
pub trait StreamConnector {
    /// Stream type produced by this connector
    type Stream: StreamSocket;

    /// Connect to `target`
    async fn connect(&self, target: SocketAddr) -> Result<Self::Stream>;
}

/// Connector producing tokio TCP streams
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    nodelay: bool,
    keepalive: Option<Duration>,
    send_buffer_size: Option<u32>,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
            keepalive: None,
            send_buffer_size: None,
        }
    }
}

impl TcpConnector {
    /// Create a connector with default options (Nagle disabled, 5s timeout)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY`
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Enable TCP keepalive probes after `idle` of inactivity
    pub fn with_keepalive(mut self, idle: Option<Duration>) -> Self {
        self.keepalive = idle;
        self
    }

    /// Request a specific `SO_SNDBUF` size
    pub fn with_send_buffer_size(mut self, size: Option<u32>) -> Self {
        self.send_buffer_size = size;
        self
    }

    /// Configured connection timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait(?Send)]
impl StreamConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, target: SocketAddr) -> Result<TcpStream> {
        let socket = if target.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }

        let stream = tokio::time::timeout(self.connect_timeout, socket.connect(target))
            .await
            .map_err(|_| Error::ConnectTimeout(target))??;

        stream.set_nodelay(self.nodelay)?;
        if let Some(idle) = self.keepalive {
            let keepalive = TcpKeepalive::new().with_time(idle);
            SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;
        }

        log::debug!("Connected stream {} -> {}", stream.local_addr()?, target);
        Ok(stream)
    }
}

impl StreamSocket for TcpStream {
    fn try_write(&self, buf: &[u8]) -> Result<usize> {
        TcpStream::try_write(self, buf).map_err(Error::from_io)
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(TcpStream::peer_addr(self)?)
    }
}
