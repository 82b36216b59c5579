//! DNS request processor
//!
//! Answers A queries with synthetic addresses from the hijack table.
//! Anything else is handed back to the caller to forward upstream.

use hickory_proto::op::{Header, Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{DNSClass, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tracing::{debug, trace};

use super::table::HijackTable;
use crate::error::HijackError;

/// Handle a DNS request and return a hijacked response
///
/// Only the first question is looked at. Non-query opcodes get a NOTIMP
/// response. Questions that are not IN-class A return
/// [`HijackError::Unsupported`] so the caller can forward them upstream.
///
/// # Errors
///
/// Returns `HijackError::NoQuestion` for an empty question section and
/// `HijackError::PoolExhausted` when the domain cannot be hijacked right now.
pub fn handle_dns_request(
    req: &Message,
    table: &HijackTable,
    proxy: &str,
) -> Result<Message, HijackError> {
    if req.op_code() != OpCode::Query || req.message_type() != MessageType::Query {
        let mut rsp = Message::new();
        rsp.set_header(Header::response_from_request(req.header()));
        rsp.set_response_code(ResponseCode::NotImp);
        return Ok(rsp);
    }

    let query = req.queries().first().ok_or(HijackError::NoQuestion)?;

    if query.query_class() != DNSClass::IN {
        debug!(class = ?query.query_class(), "not hijacking non-IN query");
        return Err(HijackError::Unsupported(query.query_type()));
    }
    if query.query_type() != RecordType::A {
        return Err(HijackError::Unsupported(query.query_type()));
    }

    let domain = query.name().to_ascii().to_ascii_lowercase();
    let domain = domain.trim_end_matches('.');

    let record = table
        .set(domain, proxy)
        .ok_or_else(|| HijackError::pool_exhausted(domain))?;

    let rsp = record.answer(req);
    trace!(domain, ip = %record.ip, id = rsp.id(), "answered hijacked query");
    Ok(rsp)
}

/// Decode a wire-format query, hijack it and encode the response
///
/// # Errors
///
/// Returns `HijackError::ParseError`/`EncodeError` on wire-format failures,
/// plus everything [`handle_dns_request`] returns.
pub fn hijack_wire_query(
    bytes: &[u8],
    table: &HijackTable,
    proxy: &str,
) -> Result<Vec<u8>, HijackError> {
    let req = Message::from_bytes(bytes).map_err(|e| HijackError::ParseError(e.to_string()))?;
    let rsp = handle_dns_request(&req, table, proxy)?;
    rsp.to_bytes()
        .map_err(|e| HijackError::EncodeError(e.to_string()))
}
