//! Endpoint selection
//!
//! Each resolution is compared with the previous one as a multiset: same
//! addresses with the same multiplicities, in any order, count as unchanged.
//! Only a different set can move the endpoint, and the endpoint always becomes
//! the first address of that new answer. A stable DNS answer therefore never
//! churns the transport handle, even when the resolver rotates its records.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

/// Multiset of resolved addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    counts: BTreeMap<IpAddr, usize>,
    len: usize,
}

impl AddressSet {
    /// Build a multiset from a resolution answer
    pub fn from_addrs(addrs: &[IpAddr]) -> Self {
        let mut counts = BTreeMap::new();
        for addr in addrs {
            *counts.entry(*addr).or_insert(0) += 1;
        }
        Self {
            counts,
            len: addrs.len(),
        }
    }

    /// Number of addresses, duplicates included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// How many times `addr` appears
    pub fn count(&self, addr: &IpAddr) -> usize {
        self.counts.get(addr).copied().unwrap_or(0)
    }

    /// Addresses in ascending order, duplicates repeated
    pub fn to_vec(&self) -> Vec<IpAddr> {
        self.counts
            .iter()
            .flat_map(|(addr, count)| std::iter::repeat(*addr).take(*count))
            .collect()
    }
}

/// Outcome of feeding a resolution to the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Same multiset as before, nothing changed
    Unchanged,
    /// New multiset stored, but its first address is the current endpoint
    Refreshed,
    /// The endpoint moved; the transport handle must be rebuilt
    Switched {
        previous: Option<SocketAddr>,
        current: SocketAddr,
    },
}

/// Tracks the last resolved multiset and the endpoint derived from it
#[derive(Debug, Clone)]
pub struct EndpointSelector {
    port: u16,
    resolved: AddressSet,
    current: Option<SocketAddr>,
}

impl EndpointSelector {
    /// Create a selector pairing addresses with `port`
    pub fn new(port: u16) -> Self {
        Self {
            port,
            resolved: AddressSet::default(),
            current: None,
        }
    }

    /// Feed a resolution answer
    ///
    /// An empty answer is not a destination; it leaves everything untouched.
    pub fn update(&mut self, addrs: &[IpAddr]) -> Selection {
        let Some(first) = addrs.first() else {
            return Selection::Unchanged;
        };

        let resolved = AddressSet::from_addrs(addrs);
        if resolved == self.resolved {
            return Selection::Unchanged;
        }
        self.resolved = resolved;

        let candidate = SocketAddr::new(*first, self.port);
        if self.current == Some(candidate) {
            return Selection::Refreshed;
        }

        let previous = self.current.replace(candidate);
        Selection::Switched {
            previous,
            current: candidate,
        }
    }

    /// Endpoint currently used for sends
    pub fn current(&self) -> Option<SocketAddr> {
        self.current
    }

    /// Multiset from the last answer that changed it
    pub fn resolved(&self) -> &AddressSet {
        &self.resolved
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
