//! Hijacked domain records

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use hickory_proto::error::ProtoResult;
use hickory_proto::op::{Header, Message};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record};

/// Routing tag that rejects connections to the domain
pub const BLOCK_PROXY: &str = "block";

/// A domain whose answers are replaced by a synthetic address
#[derive(Debug, Clone)]
pub struct DomainRecord {
    /// The hijacked hostname
    pub hostname: String,
    /// Routing tag used when dialing connections to this domain
    pub proxy: String,
    /// Synthetic address handed to clients
    pub ip: Ipv4Addr,
    /// First real address observed from an upstream resolution
    pub real_ip: Option<Ipv4Addr>,
    /// Number of lookups that hit this record
    pub hits: u64,
    /// Sliding expiry, pushed forward on every hit
    pub expires: Instant,
    ttl: Duration,
    answer: Record,
}

impl DomainRecord {
    /// Create a record with a forged answer already built
    ///
    /// The record starts expired with zero hits; the table touches it on insert.
    #[must_use]
    pub fn new(
        hostname: impl Into<String>,
        proxy: impl Into<String>,
        ip: Ipv4Addr,
        name: Name,
        ttl: Duration,
    ) -> Self {
        let answer_ttl = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX);
        Self {
            hostname: hostname.into(),
            proxy: proxy.into(),
            ip,
            real_ip: None,
            hits: 0,
            expires: Instant::now(),
            ttl,
            answer: forge_ipv4_answer(name, ip, answer_ttl),
        }
    }

    /// Build a reply to `request` carrying the cached forged answer
    #[must_use]
    pub fn answer(&self, request: &Message) -> Message {
        let mut rsp = Message::new();
        rsp.set_header(Header::response_from_request(request.header()));
        rsp.set_recursion_available(true);
        rsp.add_queries(request.queries().iter().cloned());
        rsp.add_answer(self.answer.clone());
        rsp
    }

    /// The cached forged A record
    #[must_use]
    pub fn answer_record(&self) -> &Record {
        &self.answer
    }

    /// Count a hit and push the expiry one TTL into the future
    pub fn touch(&mut self) {
        self.hits += 1;
        self.expires = Instant::now() + self.ttl;
    }

    /// Capture the real address from an upstream response
    ///
    /// Write-once: returns `false` without looking at the message if an
    /// address is already stored, or if the message has no A answer.
    pub fn set_real_ip(&mut self, msg: &Message) -> bool {
        if self.real_ip.is_some() {
            return false;
        }

        self.real_ip = msg.answers().iter().find_map(|record| match record.data() {
            Some(RData::A(a)) => Some(a.0),
            _ => None,
        });
        self.real_ip.is_some()
    }

    /// Whether connections to this domain are rejected
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.proxy == BLOCK_PROXY
    }

    /// Check if the record had expired at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires < now
    }
}

/// Convert a domain into the absolute name used in forged answers
///
/// # Errors
///
/// Returns an error if the domain is not a valid DNS name.
pub fn answer_name(domain: &str) -> ProtoResult<Name> {
    Name::from_ascii(format!("{}.", domain.trim_end_matches('.')))
}

/// Forge an IN A record pointing `name` at `ip`
#[must_use]
pub fn forge_ipv4_answer(name: Name, ip: Ipv4Addr, ttl: u32) -> Record {
    let mut record = Record::from_rdata(name, ttl, RData::A(A(ip)));
    record.set_dns_class(DNSClass::IN);
    record
}
