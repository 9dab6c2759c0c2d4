//! Connectionless transport
//!
//! A datagram socket is created per destination by a [`DatagramBinder`] and
//! sends each payload as a single datagram with a non-blocking `try_send_to`.
//!
//! [`UdpBinder`] hands out plain non-blocking std sockets. Sending never goes
//! through the runtime's readiness tracking, so a socket can send right after
//! it was bound and only reports [`Error::WouldBlock`] when the kernel buffer
//! is full.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};

/// Socket sending independent datagrams
pub trait DatagramSocket {
    /// Send `buf` as one datagram to `target` without blocking
    ///
    /// Returns [`Error::WouldBlock`] when the socket buffer is full.
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize>;

    /// Local address the socket is bound to
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Factory for datagram sockets
pub trait DatagramBinder {
    /// Socket type produced by this binder
    type Socket: DatagramSocket;

    /// Create a socket able to reach `target`
    ///
    /// The socket is bound to an ephemeral port on the wildcard address of the
    /// target's address family.
    fn bind_for(&self, target: SocketAddr) -> Result<Self::Socket>;
}

/// Binder producing non-blocking UDP sockets
#[derive(Debug, Clone, Default)]
pub struct UdpBinder {
    send_buffer_size: Option<usize>,
}

impl UdpBinder {
    /// Create a binder with system default socket options
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a specific `SO_SNDBUF` size for new sockets
    pub fn with_send_buffer_size(mut self, size: Option<usize>) -> Self {
        self.send_buffer_size = size;
        self
    }
}

impl DatagramBinder for UdpBinder {
    type Socket = UdpSocket;

    fn bind_for(&self, target: SocketAddr) -> Result<UdpSocket> {
        let (domain, local) = if target.is_ipv4() {
            (Domain::IPV4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        } else {
            (Domain::IPV6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)))
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        socket.bind(&local.into())?;

        let socket: UdpSocket = socket.into();
        log::debug!(
            "Bound datagram socket {} for {}",
            socket.local_addr()?,
            target
        );
        Ok(socket)
    }
}

impl DatagramSocket for UdpSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        self.send_to(buf, target).map_err(Error::from_io)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(UdpSocket::local_addr(self)?)
    }
}
