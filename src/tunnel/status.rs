//! Per-side tunnel status

use std::fmt;

use parking_lot::RwLock;

/// Lifecycle of one side of a tunnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TunnelStatus {
    /// Constructed, relay not started
    #[default]
    Unset,
    /// Relay running
    Proxying,
    /// Torn down; never left again
    Closed,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Proxying => write!(f, "proxying"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Status cell shared by the relay tasks
#[derive(Debug, Default)]
pub struct StatusCell(RwLock<TunnelStatus>);

impl StatusCell {
    /// Create a cell in the `Unset` state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status
    #[must_use]
    pub fn get(&self) -> TunnelStatus {
        *self.0.read()
    }

    /// Move to `status`
    ///
    /// Returns `false` if the cell is already `Closed` and `status` is not.
    pub fn set(&self, status: TunnelStatus) -> bool {
        let mut current = self.0.write();
        if *current == TunnelStatus::Closed && status != TunnelStatus::Closed {
            return false;
        }
        *current = status;
        true
    }

    /// Check if the side is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.get() == TunnelStatus::Closed
    }
}
