//! Configuration types for the sender
//!
//! A sender is described by its destination and a few transport knobs. The
//! configuration can be embedded in a larger TOML document or loaded on its
//! own.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "metrics.example.com"
//! port = 8125
//! resolve_period_ms = 60000
//! transport = "udp"          # or "tcp"
//! ipv4_only = false
//! # send_buffer_size = 262144
//!
//! # TCP only
//! tcp_nodelay = true
//! connect_timeout_ms = 5000
//! # keepalive_secs = 30
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sink_dns::SystemResolver;
use sink_transport::{TcpConnector, UdpBinder};

use crate::error::{Error, Result};

/// Immutable description of where a sender delivers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    host: String,
    port: u16,
    resolve_period: Duration,
}

impl Destination {
    /// Create a destination, rejecting values a sender cannot work with
    pub fn new(host: impl Into<String>, port: u16, resolve_period: Duration) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Error::Config("host is required".into()));
        }
        if port == 0 {
            return Err(Error::Config("port must be non-zero".into()));
        }
        if resolve_period.is_zero() {
            return Err(Error::Config("resolve period must be non-zero".into()));
        }

        Ok(Self {
            host,
            port,
            resolve_period,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Time between the end of one resolution and the start of the next
    pub fn resolve_period(&self) -> Duration {
        self.resolve_period
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Transport used to reach the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Connectionless datagrams
    #[default]
    Udp,
    /// Connection-oriented stream
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Udp => write!(f, "udp"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Sender configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Destination hostname or IP literal
    pub host: String,

    /// Destination port
    pub port: u16,

    /// Milliseconds between resolutions of `host`
    #[serde(default = "default_resolve_period_ms")]
    pub resolve_period_ms: u64,

    /// Transport (`udp` or `tcp`)
    #[serde(default)]
    pub transport: TransportKind,

    /// Ignore IPv6 addresses in resolution answers
    #[serde(default)]
    pub ipv4_only: bool,

    /// Requested socket send buffer size in bytes (system default if unset)
    #[serde(default)]
    pub send_buffer_size: Option<usize>,

    /// Disable Nagle's algorithm on TCP streams
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,

    /// Upper bound for establishing a TCP connection, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Idle seconds before TCP keepalive probes start (disabled if unset)
    #[serde(default)]
    pub keepalive_secs: Option<u64>,
}

impl SenderConfig {
    /// Create a configuration with defaults for everything but the destination
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            resolve_period_ms: default_resolve_period_ms(),
            transport: TransportKind::default(),
            ipv4_only: false,
            send_buffer_size: None,
            tcp_nodelay: true,
            connect_timeout_ms: default_connect_timeout_ms(),
            keepalive_secs: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SenderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host is required".into()));
        }

        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".into()));
        }

        if self.resolve_period_ms == 0 {
            return Err(Error::Config("resolve_period_ms must be non-zero".into()));
        }

        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be non-zero".into()));
        }

        if let Some(size) = self.send_buffer_size {
            if size == 0 || u32::try_from(size).is_err() {
                return Err(Error::Config(format!(
                    "send_buffer_size {} is out of range",
                    size
                )));
            }
        }

        if self.keepalive_secs == Some(0) {
            return Err(Error::Config("keepalive_secs must be non-zero".into()));
        }

        Ok(())
    }

    /// Destination described by this configuration
    pub fn destination(&self) -> Result<Destination> {
        Destination::new(self.host.clone(), self.port, self.resolve_period())
    }

    pub fn resolve_period(&self) -> Duration {
        Duration::from_millis(self.resolve_period_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// System resolver honouring `ipv4_only`
    pub fn resolver(&self) -> SystemResolver {
        SystemResolver::new().ipv4_only(self.ipv4_only)
    }

    /// UDP binder honouring the socket options
    pub fn udp_binder(&self) -> UdpBinder {
        UdpBinder::new().with_send_buffer_size(self.send_buffer_size)
    }

    /// TCP connector honouring the socket options
    pub fn tcp_connector(&self) -> TcpConnector {
        TcpConnector::new()
            .with_connect_timeout(self.connect_timeout())
            .with_nodelay(self.tcp_nodelay)
            .with_keepalive(self.keepalive_secs.map(Duration::from_secs))
            .with_send_buffer_size(self.send_buffer_size.and_then(|s| u32::try_from(s).ok()))
    }
}

fn default_resolve_period_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}
