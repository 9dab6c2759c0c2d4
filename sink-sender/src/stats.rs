//! Sender statistics
//!
//! Counters are atomics so an operator thread can sample them while the event
//! loop thread updates them. None of them is ever reset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counters describing a sender's activity
#[derive(Debug, Default)]
pub struct SenderStats {
    dropped_bytes: AtomicU64,
    dropped_payloads: AtomicU64,
    sent_bytes: AtomicU64,
    sent_payloads: AtomicU64,
    resolve_attempts: AtomicU64,
    resolve_failures: AtomicU64,
    endpoint_changes: AtomicU64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload that could not be sent
    pub fn record_dropped(&self, bytes: usize) {
        self.dropped_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.dropped_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload handed to the transport
    pub fn record_sent(&self, bytes: usize) {
        self.sent_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.sent_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed resolution, successful or not
    pub fn record_resolve(&self, failed: bool) {
        self.resolve_attempts.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.resolve_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a switch of the current endpoint
    pub fn record_endpoint_change(&self) {
        self.endpoint_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Total bytes dropped since construction
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes.load(Ordering::Relaxed)
    }

    /// Get a snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dropped_bytes: self.dropped_bytes.load(Ordering::Relaxed),
            dropped_payloads: self.dropped_payloads.load(Ordering::Relaxed),
            sent_bytes: self.sent_bytes.load(Ordering::Relaxed),
            sent_payloads: self.sent_payloads.load(Ordering::Relaxed),
            resolve_attempts: self.resolve_attempts.load(Ordering::Relaxed),
            resolve_failures: self.resolve_failures.load(Ordering::Relaxed),
            endpoint_changes: self.endpoint_changes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of stats at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub dropped_bytes: u64,
    pub dropped_payloads: u64,
    pub sent_bytes: u64,
    pub sent_payloads: u64,
    pub resolve_attempts: u64,
    pub resolve_failures: u64,
    pub endpoint_changes: u64,
}

/// Reference to shared stats
pub type SenderStatsRef = Arc<SenderStats>;
