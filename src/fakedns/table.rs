//! Hijack table
//!
//! Owns the bijective domain <-> synthetic address mapping and the
//! independent set of domains that bypass the proxy.
//!
//! Two locks keep unrelated traffic apart:
//! - the records lock guards the pool and both record maps, which are
//!   always read and written together;
//! - the non-proxy lock guards the bypass set.
//!
//! Lookups return snapshots of records. Nothing outside the table ever
//! holds a reference into its maps.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::op::Message;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::FakeDnsConfig;
use super::pool::Ipv4Pool;
use super::record::{answer_name, DomainRecord};

/// Upper bound of the eviction threshold
pub const MAX_EVICTION_THRESHOLD: usize = 1000;

/// Shortest reaper tick; shorter intervals are raised to this
pub const MIN_REAPER_INTERVAL: Duration = Duration::from_millis(1);

/// Number of live records at or below which the reaper skips its sweep
#[must_use]
pub fn eviction_threshold(capacity: usize) -> usize {
    MAX_EVICTION_THRESHOLD.min(capacity / 10)
}

/// Statistics for the hijack table
#[derive(Debug, Default)]
pub struct HijackStats {
    /// Domains that received a synthetic address
    pub hijacked: AtomicU64,
    /// Lookups by domain or address
    pub lookups: AtomicU64,
    /// Lookups that found a live record
    pub hits: AtomicU64,
    /// Records removed by the reaper
    pub evictions: AtomicU64,
    /// Hijack attempts refused for lack of addresses
    pub exhausted: AtomicU64,
}

impl HijackStats {
    /// Get a snapshot of current stats
    #[must_use]
    pub fn snapshot(&self) -> HijackStatsSnapshot {
        HijackStatsSnapshot {
            hijacked: self.hijacked.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of hijack statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HijackStatsSnapshot {
    pub hijacked: u64,
    pub lookups: u64,
    pub hits: u64,
    pub evictions: u64,
    pub exhausted: u64,
}

/// State guarded by the records lock
#[derive(Debug)]
struct Records {
    pool: Ipv4Pool,
    by_domain: HashMap<String, DomainRecord>,
    by_ip: HashMap<Ipv4Addr, String>,
}

impl Records {
    fn touch(&mut self, domain: &str) -> Option<DomainRecord> {
        self.by_domain.get_mut(domain).map(|record| {
            record.touch();
            record.clone()
        })
    }
}

/// Domain hijack table with sliding-TTL eviction
#[derive(Debug)]
pub struct HijackTable {
    records: Mutex<Records>,
    non_proxy: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    stats: HijackStats,
}

impl HijackTable {
    /// Create a table over `network`, reserving `gateway` for the interface
    #[must_use]
    pub fn new(gateway: Ipv4Addr, network: Ipv4Net, ttl: Duration) -> Self {
        Self {
            records: Mutex::new(Records {
                pool: Ipv4Pool::new(network, gateway),
                by_domain: HashMap::new(),
                by_ip: HashMap::new(),
            }),
            non_proxy: Mutex::new(HashMap::new()),
            ttl,
            stats: HijackStats::default(),
        }
    }

    /// Create a table from configuration
    #[must_use]
    pub fn from_config(config: &FakeDnsConfig) -> Self {
        Self::new(config.gateway, config.network, config.ttl())
    }

    /// Look up a domain, refreshing its TTL on hit
    pub fn get(&self, domain: &str) -> Option<DomainRecord> {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        let record = self.records.lock().touch(domain);
        if record.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        record
    }

    /// Look up the domain owning a synthetic address, refreshing its TTL on hit
    pub fn get_by_ip(&self, ip: Ipv4Addr) -> Option<DomainRecord> {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        let record = {
            let mut records = self.records.lock();
            let domain = records.by_ip.get(&ip).cloned();
            domain.and_then(|domain| records.touch(&domain))
        };
        if record.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        record
    }

    /// Check if an address belongs to the synthetic subnet
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.records.lock().pool.contains(ip)
    }

    /// Hijack a domain
    ///
    /// Returns the existing record unchanged if the domain is already
    /// hijacked. Returns `None` if the domain is not a valid DNS name or the
    /// pool has no free address; the caller must not hijack it this time.
    pub fn set(&self, domain: &str, proxy: &str) -> Option<DomainRecord> {
        let mut guard = self.records.lock();
        if let Some(record) = guard.by_domain.get(domain) {
            return Some(record.clone());
        }

        let name = match answer_name(domain) {
            Ok(name) => name,
            Err(e) => {
                warn!(domain, error = %e, "refusing to hijack invalid domain name");
                return None;
            }
        };

        let records = &mut *guard;
        let Some(ip) = records.pool.allocate(domain) else {
            self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
            warn!(domain, "ip space is used up");
            return None;
        };

        let mut record = DomainRecord::new(domain, proxy, ip, name, self.ttl);
        record.touch();

        records.by_ip.insert(ip, domain.to_owned());
        records.by_domain.insert(domain.to_owned(), record.clone());
        self.stats.hijacked.fetch_add(1, Ordering::Relaxed);

        info!(domain, %ip, proxy, "hijack");
        Some(record)
    }

    /// Record the real address from an upstream response for a hijacked domain
    ///
    /// Returns `true` if the address was stored by this call.
    pub fn set_real_ip(&self, domain: &str, msg: &Message) -> bool {
        self.records
            .lock()
            .by_domain
            .get_mut(domain)
            .is_some_and(|record| record.set_real_ip(msg))
    }

    /// Check if a domain is currently marked as resolved directly
    #[must_use]
    pub fn is_non_proxy_domain(&self, domain: &str) -> bool {
        self.non_proxy.lock().contains_key(domain)
    }

    /// Mark a domain as resolved directly for `ttl_secs`
    pub fn set_non_proxy_domain(&self, domain: &str, ttl_secs: u32) {
        let expires = Instant::now() + Duration::from_secs(u64::from(ttl_secs));
        self.non_proxy.lock().insert(domain.to_owned(), expires);
    }

    /// Delete every non-proxy domain whose expiry has passed
    ///
    /// Returns the number of entries removed.
    pub fn clear_expired_non_proxy_domains(&self, now: Instant) -> usize {
        let mut non_proxy = self.non_proxy.lock();
        let before = non_proxy.len();
        non_proxy.retain(|domain, expires| {
            let keep = *expires >= now;
            if !keep {
                debug!(domain = %domain, "release non proxy domain");
            }
            keep
        });
        before - non_proxy.len()
    }

    /// Delete every expired hijack record, once the table is large enough
    ///
    /// Does nothing while the number of live records is at or below
    /// [`eviction_threshold`]. Returns the number of records removed.
    pub fn clear_expired_domains(&self, now: Instant) -> usize {
        let mut guard = self.records.lock();
        let records = &mut *guard;

        let threshold = eviction_threshold(records.pool.capacity());
        if records.by_domain.len() <= threshold {
            return 0;
        }

        let before = records.by_domain.len();
        let by_ip = &mut records.by_ip;
        let pool = &mut records.pool;
        records.by_domain.retain(|domain, record| {
            if !record.is_expired_at(now) {
                return true;
            }
            by_ip.remove(&record.ip);
            pool.release(record.ip);
            debug!(domain = %domain, ip = %record.ip, hits = record.hits, "release");
            false
        });

        let removed = before - records.by_domain.len();
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Run one reaper tick: both sweeps, independently
    pub fn reap(&self, now: Instant) -> (usize, usize) {
        let domains = self.clear_expired_domains(now);
        let non_proxy = self.clear_expired_non_proxy_domains(now);
        if domains > 0 || non_proxy > 0 {
            info!(
                domains,
                non_proxy,
                live = self.len(),
                "hijack table cleanup completed"
            );
        }
        (domains, non_proxy)
    }

    /// Spawn the periodic reaper
    ///
    /// The first sweep happens one `interval` after the call. The task ends
    /// when `shutdown` is cancelled. `interval` is clamped to at least
    /// [`MIN_REAPER_INTERVAL`].
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        if interval < MIN_REAPER_INTERVAL {
            warn!(?interval, "reaper interval too short, using {:?}", MIN_REAPER_INTERVAL);
        }
        let interval = interval.max(MIN_REAPER_INTERVAL);
        let table = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("hijack table reaper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        table.reap(Instant::now());
                    }
                }
            }
        })
    }

    /// Drop every record and bypass entry for a new gateway/subnet
    ///
    /// All addresses go back to the current pool first. If the gateway or
    /// the subnet changed, the pool is then rebuilt for the new parameters.
    pub fn reload(&self, gateway: Ipv4Addr, network: Ipv4Net) {
        info!(%gateway, %network, "hijack table hot reloaded");
        self.non_proxy.lock().clear();

        let mut guard = self.records.lock();
        let records = &mut *guard;
        for (_, record) in records.by_domain.drain() {
            records.pool.release(record.ip);
        }
        records.by_ip.clear();

        let network = network.trunc();
        if records.pool.network() != network || records.pool.gateway() != gateway {
            records.pool = Ipv4Pool::new(network, gateway);
        }
    }

    /// Number of live hijack records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().by_domain.len()
    }

    /// Check if no domain is hijacked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().by_domain.is_empty()
    }

    /// Number of domains currently in the bypass set
    #[must_use]
    pub fn non_proxy_len(&self) -> usize {
        self.non_proxy.lock().len()
    }

    /// Usable addresses in the pool
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.lock().pool.capacity()
    }

    /// Current eviction threshold
    #[must_use]
    pub fn threshold(&self) -> usize {
        eviction_threshold(self.capacity())
    }

    /// Sliding TTL of records
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &HijackStats {
        &self.stats
    }

    /// Check the domain <-> address bijection and pool bookkeeping
    #[cfg(test)]
    fn assert_consistent(&self) {
        let records = self.records.lock();
        assert_eq!(records.by_domain.len(), records.by_ip.len());
        assert_eq!(records.by_domain.len(), records.pool.allocated());
        for (domain, record) in &records.by_domain {
            assert_eq!(records.by_ip.get(&record.ip), Some(domain));
            assert!(records.pool.is_allocated(record.ip));
        }
    }
}
