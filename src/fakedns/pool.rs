//! Synthetic address pool
//!
//! Hands out IPv4 addresses from the reserved FakeDNS subnet. A rotating
//! cursor walks the host range so that a just-released address is only
//! reused once the rest of the range has been tried.
//!
//! The pool has no internal locking. It is owned by the hijack table and
//! only touched while the table's records lock is held.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use tracing::{error, trace};

/// IPv4 address pool with cursor-based allocation
#[derive(Debug)]
pub struct Ipv4Pool {
    /// The reserved subnet
    network: Ipv4Net,
    /// Virtual interface address, never allocated
    gateway: Ipv4Addr,
    /// First host address (network + 1)
    first: u32,
    /// Number of host slots between the network and broadcast addresses
    span: u32,
    /// Usable addresses: host slots minus the gateway
    capacity: usize,
    /// Next slot to try, relative to `first`
    cursor: u32,
    /// Addresses currently handed out
    allocated: HashSet<Ipv4Addr>,
}

impl Ipv4Pool {
    /// Create a new pool over `network`, reserving `gateway`
    #[must_use]
    pub fn new(network: Ipv4Net, gateway: Ipv4Addr) -> Self {
        let network = network.trunc();
        let size = 1u64 << (32 - u32::from(network.prefix_len()));
        // /31 and /32 have no room once network and broadcast are reserved
        let span = u32::try_from(size.saturating_sub(2)).unwrap_or(u32::MAX);
        let first = u32::from(network.network()).wrapping_add(1);

        let gateway_in_range = span > 0 && {
            let gw = u32::from(gateway);
            gw >= first && gw - first < span
        };
        let capacity = span as usize - usize::from(gateway_in_range);

        Self {
            network,
            gateway,
            first,
            span,
            capacity,
            cursor: 0,
            allocated: HashSet::new(),
        }
    }

    /// Take a free address for `domain`
    ///
    /// Returns `None` when every usable address is outstanding.
    pub fn allocate(&mut self, domain: &str) -> Option<Ipv4Addr> {
        if self.allocated.len() >= self.capacity {
            return None;
        }

        for _ in 0..self.span {
            let addr = Ipv4Addr::from(self.first + self.cursor);
            self.cursor = (self.cursor + 1) % self.span;

            if addr == self.gateway || self.allocated.contains(&addr) {
                continue;
            }

            self.allocated.insert(addr);
            trace!(domain, %addr, "allocated synthetic address");
            return Some(addr);
        }

        None
    }

    /// Return an address to the free set
    ///
    /// Returns `false` if the address was not outstanding. That is a caller
    /// bug: the table only releases addresses it is removing from its maps.
    pub fn release(&mut self, addr: Ipv4Addr) -> bool {
        if self.allocated.remove(&addr) {
            trace!(%addr, "released synthetic address");
            true
        } else {
            error!(%addr, "release of synthetic address that is not allocated");
            false
        }
    }

    /// Check if an address lies within the reserved subnet
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.network.contains(&addr)
    }

    /// Total number of usable addresses
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of addresses currently handed out
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated.len()
    }

    /// Check if an address is currently handed out
    #[must_use]
    pub fn is_allocated(&self, addr: Ipv4Addr) -> bool {
        self.allocated.contains(&addr)
    }

    /// Get the network range
    #[must_use]
    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    /// Get the reserved gateway address
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }
}
