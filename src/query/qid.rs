//! Query id generation and the originator-IP round trip. Mirrors
//! `opserver.py`'s `uuid.uuid1(redis_query_ip)` /
//! `_get_redis_query_ip_from_qid`: a v1 UUID's 48-bit "node" field is seeded
//! with the originator's IPv4 address
//! zero-extended into the upper 16 bits, so the low 32 bits of the node
//! field recover the address exactly.

use std::net::Ipv4Addr;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Single process-wide v1 context. `Context::new` seeds its internal
/// sequence counter at the given count and hands out `count`, `count+1`, ...
/// on successive `generate_sequence` calls; constructing a fresh `Context`
/// per qid would make every call return the same first sequence number, so
/// this one is shared across every `generate_qid`/`generate_purge_id` call
/// in the process.
pub fn v1_context() -> &'static uuid::v1::Context {
    static CONTEXT: OnceLock<uuid::v1::Context> = OnceLock::new();
    CONTEXT.get_or_init(|| uuid::v1::Context::new(0))
}

pub fn generate_qid(originator_ip: Ipv4Addr) -> String {
    let octets = originator_ip.octets();
    let node_id: [u8; 6] = [0, 0, octets[0], octets[1], octets[2], octets[3]];
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let ts = uuid::v1::Timestamp::from_unix(v1_context(), now.as_secs(), now.subsec_nanos());
    let uuid = Uuid::new_v1(ts, &node_id);
    uuid.hyphenated().to_string()
}

/// Recovers the originator IP from a qid generated by `generate_qid`.
/// Returns `None` for a malformed qid.
pub fn ip_from_qid(qid: &str) -> Option<Ipv4Addr> {
    let node_segment = qid.rsplit('-').next()?;
    if node_segment.len() != 12 {
        return None;
    }
    let node_value = u64::from_str_radix(node_segment, 16).ok()?;
    if node_value > u32::MAX as u64 {
        return None;
    }
    let ip_u32 = node_value as u32;
    Some(Ipv4Addr::from(ip_u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_originator_ip() {
        let ip = Ipv4Addr::new(10, 20, 30, 40);
        let qid = generate_qid(ip);
        assert_eq!(ip_from_qid(&qid), Some(ip));
    }

    #[test]
    fn rejects_malformed_qid() {
        assert_eq!(ip_from_qid("not-a-uuid"), None);
        assert_eq!(ip_from_qid(""), None);
    }

    #[test]
    fn different_ips_yield_recoverable_distinct_qids() {
        let a = generate_qid(Ipv4Addr::new(1, 2, 3, 4));
        let b = generate_qid(Ipv4Addr::new(5, 6, 7, 8));
        assert_ne!(a, b);
        assert_eq!(ip_from_qid(&a), Some(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(ip_from_qid(&b), Some(Ipv4Addr::new(5, 6, 7, 8)));
    }

    #[test]
    fn repeated_calls_from_the_same_ip_never_collide() {
        let ip = Ipv4Addr::new(9, 9, 9, 9);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let qid = generate_qid(ip);
            assert!(seen.insert(qid.clone()), "duplicate qid for repeated calls from one IP: {qid}");
            assert_eq!(ip_from_qid(&qid), Some(ip));
        }
    }
}
