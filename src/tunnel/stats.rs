//! Tunnel statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic statistics for a TCP handler
#[derive(Debug, Default)]
pub struct TunnelStats {
    /// Accept events handled
    accepted: AtomicU64,
    /// Tunnels currently relaying
    active: AtomicU64,
    /// Tunnels that finished without a close reason
    completed: AtomicU64,
    /// Tunnels that finished with a close reason
    errored: AtomicU64,
    /// Accept events that never became a tunnel (dial failure)
    failed: AtomicU64,
    /// Accept events rejected by the block policy
    blocked: AtomicU64,
    /// Bytes relayed from the virtual endpoints to the proxy
    bytes_up: AtomicU64,
    /// Bytes relayed from the proxy to the virtual endpoints
    bytes_down: AtomicU64,
}

impl TunnelStats {
    /// Create new tunnel statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accept event
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tunnel that started relaying
    pub fn record_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished tunnel
    pub fn record_finished(&self, bytes_up: u64, bytes_down: u64, clean: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if clean {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errored.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_up.fetch_add(bytes_up, Ordering::Relaxed);
        self.bytes_down.fetch_add(bytes_down, Ordering::Relaxed);
    }

    /// Record an accept event that failed to dial
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accept event for a blocked domain
    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Get currently active tunnels
    #[must_use]
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all statistics
    #[must_use]
    pub fn snapshot(&self) -> TunnelStatsSnapshot {
        TunnelStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active(),
            completed: self.completed.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of tunnel statistics at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStatsSnapshot {
    pub accepted: u64,
    pub active: u64,
    pub completed: u64,
    pub errored: u64,
    pub failed: u64,
    pub blocked: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
}

impl TunnelStatsSnapshot {
    /// Get total bytes transferred (both directions)
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.bytes_up + self.bytes_down
    }
}
