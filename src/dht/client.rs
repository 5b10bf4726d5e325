/*! `ClientData`: one routing-table entry, plus the `ReturnIp` a peer has
told us we appear to send from. Grounded on `DHT.c`'s `Client_data`/
`IPPTsPng` pair and the teacher's `PingData` (`dht/server/client.rs`,
referenced from `dht_friend.rs`/`ping_sender.rs` but not itself retrieved
in the pack - its usage there fixes the shape this module must have).
*/

use std::time::{Duration, Instant};

use crypto_core::PublicKey;
use dht::packed_node::PackedNode;

/// An external address a peer reported seeing *us* from, used to detect
/// which NAT mapping a friend's close nodes observe (§4.6).
#[derive(Clone, Copy, Debug)]
pub struct ReturnIp {
    /// The address the peer says it sees us from.
    pub addr: ::std::net::SocketAddr,
    /// When that report was received.
    pub received_at: Instant,
}

/// How fresh a `ReturnIp` report must be to still count for NAT-punch
/// quorum purposes. The spec doesn't name this independently of
/// `bad_node_timeout`, so this module reuses it (a return-ip older than a
/// bad node is exactly as stale).
pub fn return_ip_is_fresh(timestamp: Instant, bad_node_timeout: Duration) -> bool {
    timestamp.elapsed() < bad_node_timeout
}

/// One routing-table slot: a node id, the address it was last heard from
/// at, and the liveness bookkeeping needed to classify it good/bad/dead.
#[derive(Clone)]
pub struct ClientData {
    /// Node's public key / id.
    pub pk: PublicKey,
    /// Address last heard from.
    pub saddr: ::std::net::SocketAddr,
    /// When we last received *any* authenticated packet from this node.
    pub last_heard_from: Instant,
    /// When we last sent this node a ping request.
    pub last_pinged: Instant,
    /// The address this node reports seeing us from, if it has ever
    /// included our id in a `NodesResponse`/`SendNodes` to us.
    pub return_ip: Option<ReturnIp>,
}

impl ClientData {
    /// A fresh entry, as if just inserted from a just-received packet.
    pub fn new(pk: PublicKey, saddr: ::std::net::SocketAddr) -> Self {
        let now = Instant::now();
        ClientData {
            pk,
            saddr,
            last_heard_from: now,
            last_pinged: now,
            return_ip: None,
        }
    }

    /// Refresh `last_heard_from` and the observed address, without
    /// touching anything else - this is the "idempotent" branch of
    /// `add_to_lists` (§4.4 step 1).
    pub fn touch(&mut self, saddr: ::std::net::SocketAddr) {
        self.saddr = saddr;
        self.last_heard_from = Instant::now();
    }

    /// `true` if we haven't heard from this node in `bad_node_timeout`.
    pub fn is_bad(&self, bad_node_timeout: Duration) -> bool {
        self.last_heard_from.elapsed() >= bad_node_timeout
    }

    /// `true` if we haven't heard from this node in `kill_node_timeout`.
    pub fn is_dead(&self, kill_node_timeout: Duration) -> bool {
        self.last_heard_from.elapsed() >= kill_node_timeout
    }

    /// `true` if strictly neither bad nor dead.
    pub fn is_good(&self, bad_node_timeout: Duration) -> bool {
        !self.is_bad(bad_node_timeout)
    }

    /// This entry as a `PackedNode`, for building `SendNodes` responses
    /// or rendezvous publish fan-out lists.
    pub fn to_packed_node(&self) -> PackedNode {
        PackedNode::new(self.pk, self.saddr)
    }

    /// Record that `self.pk` told us it sees us at `addr`.
    pub fn record_return_ip(&mut self, addr: ::std::net::SocketAddr) {
        self.return_ip = Some(ReturnIp { addr, received_at: Instant::now() });
    }

    /// Record that we just sent this entry a ping request, so periodic
    /// maintenance doesn't consider it due again until `ping_interval`
    /// elapses (§4.5's `do_close`/`do_friends` pinging cadence).
    pub fn mark_pinged(&mut self) {
        self.last_pinged = Instant::now();
    }
}

/// One outstanding ping challenge, tracked per contacted public key
/// (teacher's `PingData`, referenced by `server.get_ping_map()` in
/// `ping_sender.rs`/`dht_friend.rs`).
#[derive(Clone, Copy)]
pub struct PingData {
    outstanding_id: Option<u64>,
    issued_at: Instant,
    /// When we last sent this node a `NodesRequest`.
    pub last_ping_req_time: Instant,
    /// When we last received a response from this node at all (used for
    /// the "is this node still good" filter in friend-list maintenance).
    pub last_resp_time: Instant,
}

impl PingData {
    /// A fresh record: no outstanding challenge, and conservatively "just
    /// pinged" / "never responded" so maintenance logic doesn't treat a
    /// brand new entry as overdue in the same tick it was created.
    pub fn new() -> Self {
        let now = Instant::now();
        PingData {
            outstanding_id: None,
            issued_at: now,
            last_ping_req_time: now,
            last_resp_time: now,
        }
    }

    /// Record that we just sent a fresh challenge `id`.
    pub fn set_ping_id(&mut self, id: u64) {
        self.outstanding_id = Some(id);
        self.issued_at = Instant::now();
        self.last_ping_req_time = Instant::now();
    }

    /// Does `id` match our outstanding challenge and is it still within
    /// `timeout`? Consumes the outstanding id either way, matching the
    /// "a ping id is single-use" contract in §4.3.
    pub fn check_ping_id(&mut self, id: u64, timeout: Duration) -> bool {
        let matches = self.outstanding_id == Some(id) && self.issued_at.elapsed() <= timeout;
        self.outstanding_id = None;
        if matches {
            self.last_resp_time = Instant::now();
        }
        matches
    }
}

impl Default for PingData {
    fn default() -> Self {
        PingData::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    #[test]
    fn touch_refreshes_timestamp_only() {
        let mut client = ClientData::new(gen_keypair().0, "127.0.0.1:1".parse().unwrap());
        let pk_before = client.pk;
        ::std::thread::sleep(Duration::from_millis(5));
        client.touch("127.0.0.1:2".parse().unwrap());
        assert_eq!(client.pk, pk_before);
        assert_eq!(client.saddr, "127.0.0.1:2".parse().unwrap());
    }

    #[test]
    fn good_bad_dead_classification() {
        let client = ClientData::new(gen_keypair().0, "127.0.0.1:1".parse().unwrap());
        assert!(client.is_good(Duration::from_secs(70)));
        assert!(!client.is_bad(Duration::from_secs(70)));
        assert!(!client.is_dead(Duration::from_secs(300)));
    }

    #[test]
    fn ping_id_is_single_use() {
        let mut ping = PingData::new();
        ping.set_ping_id(42);
        assert!(ping.check_ping_id(42, Duration::from_secs(5)));
        // second check with the same id fails: it was consumed above
        ping.set_ping_id(42);
        assert!(!ping.check_ping_id(7, Duration::from_secs(5)));
    }
}
