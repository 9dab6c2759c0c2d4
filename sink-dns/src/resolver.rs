//! Resolver trait and the system-backed implementation

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Asynchronous hostname resolver
///
/// Implementations must not block the calling thread. The returned addresses
/// keep the order and duplicates of the underlying answer; callers decide what
/// equality means for them.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` into its current addresses
    ///
    /// An answer without addresses is reported as [`Error::NoAddresses`].
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`)
///
/// Lookups run on tokio's blocking pool, so awaiting them never stalls the
/// event loop. IP literals resolve to themselves.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver {
    ipv4_only: bool,
}

impl SystemResolver {
    /// Create a resolver returning both IPv4 and IPv6 addresses
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop IPv6 addresses from every answer
    pub fn ipv4_only(mut self, enabled: bool) -> Self {
        self.ipv4_only = enabled;
        self
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        // Port is irrelevant here; the sender pairs addresses with its own port.
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|source| Error::Lookup {
                host: host.to_string(),
                source,
            })?;

        let ips: Vec<IpAddr> = addrs
            .map(|addr| addr.ip())
            .filter(|ip| !self.ipv4_only || ip.is_ipv4())
            .collect();

        if ips.is_empty() {
            return Err(Error::NoAddresses(host.to_string()));
        }

        log::debug!("Resolved {} to {} address(es): {:?}", host, ips.len(), ips);
        Ok(ips)
    }
}
