//! Sender events
//!
//! Events are delivered synchronously on the event loop thread, from inside
//! resolution and connect completions. Handlers must return quickly.

use std::net::{IpAddr, SocketAddr};

/// Events emitted by a sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderEvent {
    /// Sender started its periodic resolution
    Started {
        /// Destination as `host:port`
        destination: String,
    },

    /// Sender stopped
    Stopped {
        /// Destination as `host:port`
        destination: String,
    },

    /// A resolution produced addresses
    Resolved {
        host: String,
        addrs: Vec<IpAddr>,
    },

    /// A resolution failed; the current endpoint is kept
    ResolveFailed {
        host: String,
        /// Endpoint still in use, if any
        kept: Option<SocketAddr>,
        error: String,
    },

    /// The current endpoint switched
    EndpointChanged {
        previous: Option<SocketAddr>,
        current: SocketAddr,
    },

    /// A stream to the endpoint was established
    Connected { endpoint: SocketAddr },

    /// Establishing a stream failed
    ConnectFailed { endpoint: SocketAddr, error: String },

    /// An established stream was invalidated
    Disconnected { endpoint: SocketAddr, reason: String },
}

/// Event handler trait for receiving sender events
pub trait EventHandler: Send + Sync {
    /// Handle a sender event
    fn on_event(&self, event: &SenderEvent);
}

/// Simple event handler that logs events
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: &SenderEvent) {
        match event {
            SenderEvent::Started { destination } => {
                log::info!("Sender for {} started", destination);
            }
            SenderEvent::Stopped { destination } => {
                log::info!("Sender for {} stopped", destination);
            }
            SenderEvent::Resolved { host, addrs } => {
                log::debug!("Resolved {}: {:?}", host, addrs);
            }
            SenderEvent::ResolveFailed { host, kept, error } => {
                log::debug!("Resolution of {} failed: {}, endpoint {:?}", host, error, kept);
            }
            SenderEvent::EndpointChanged { previous, current } => match previous {
                Some(previous) => log::info!("Endpoint changed: {} -> {}", previous, current),
                None => log::info!("Endpoint selected: {}", current),
            },
            SenderEvent::Connected { endpoint } => {
                log::info!("Connected to {}", endpoint);
            }
            SenderEvent::ConnectFailed { endpoint, error } => {
                log::warn!("Connection to {} failed: {}", endpoint, error);
            }
            SenderEvent::Disconnected { endpoint, reason } => {
                log::warn!("Disconnected from {}: {}", endpoint, reason);
            }
        }
    }
}
