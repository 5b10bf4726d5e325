/*! Outstanding `NodesRequest` tracking: remembers which ping id we sent to
which address so an incoming `NodesResponse` can be checked against an
actual outstanding request instead of being trusted blindly. Grounded on
`DHT.c`'s `get_close_nodes_inner`/`send_nodes_request`'s companion ping-id
table and the teacher's `NodesRequestPayload{ pk, id }` round trip in
`dht/packet/nodes_request.rs`.
*/

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use config::MAX_GETNODES_TABLE;
use crypto_core::PublicKey;

struct Outstanding {
    target_pk: PublicKey,
    saddr: SocketAddr,
    ping_id: u64,
    sent_at: Instant,
}

/// Bounded table of outstanding `NodesRequest`s, keyed implicitly by
/// `(target_pk, ping_id)`. A `NodesResponse` that doesn't match a live
/// entry here is an unsolicited reply and must be dropped (§4.3 edge case).
pub struct GetNodesTable {
    entries: Vec<Outstanding>,
}

impl GetNodesTable {
    /// An empty table.
    pub fn new() -> Self {
        GetNodesTable { entries: Vec::with_capacity(MAX_GETNODES_TABLE) }
    }

    /// Record that we just sent a `NodesRequest` with `ping_id` to
    /// `target_pk` at `saddr`. Evicts the oldest entry if the table is at
    /// capacity, since a full table means we're too eagerly requesting
    /// nodes; this never blocks sending the request itself.
    pub fn insert(&mut self, target_pk: PublicKey, saddr: SocketAddr, ping_id: u64) {
        if self.entries.len() >= MAX_GETNODES_TABLE {
            self.entries.remove(0);
        }
        self.entries.push(Outstanding { target_pk, saddr, ping_id, sent_at: Instant::now() });
    }

    /// Check and consume an outstanding entry matching `from_pk`/`from_addr`
    /// and `ping_id`, within `timeout`. A `NodesResponse` passes this check
    /// exactly once.
    pub fn check(
        &mut self,
        from_pk: &PublicKey,
        from_addr: SocketAddr,
        ping_id: u64,
        timeout: Duration,
    ) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| {
            &e.target_pk == from_pk && e.saddr == from_addr && e.ping_id == ping_id
        }) {
            let fresh = self.entries[pos].sent_at.elapsed() <= timeout;
            self.entries.remove(pos);
            fresh
        } else {
            false
        }
    }

    /// Drop entries that have aged out without a matching response.
    pub fn remove_expired(&mut self, timeout: Duration) {
        self.entries.retain(|e| e.sent_at.elapsed() <= timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    fn addr() -> SocketAddr {
        "127.0.0.1:33445".parse().unwrap()
    }

    #[test]
    fn matching_response_passes_once() {
        let mut table = GetNodesTable::new();
        let pk = gen_keypair().0;
        table.insert(pk, addr(), 42);
        assert!(table.check(&pk, addr(), 42, Duration::from_secs(5)));
        assert!(!table.check(&pk, addr(), 42, Duration::from_secs(5)));
    }

    #[test]
    fn unsolicited_response_is_rejected() {
        let mut table = GetNodesTable::new();
        let pk = gen_keypair().0;
        assert!(!table.check(&pk, addr(), 42, Duration::from_secs(5)));
    }

    #[test]
    fn mismatched_address_is_rejected() {
        let mut table = GetNodesTable::new();
        let pk = gen_keypair().0;
        table.insert(pk, addr(), 42);
        let other: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert!(!table.check(&pk, other, 42, Duration::from_secs(5)));
    }
}
