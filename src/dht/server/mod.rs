/*! `Server`: the tickable unit tying the close list, friend lists, NAT
state, and rendezvous store together, matching the teacher's
`toxcore::dht::server::Server` role (`dht_friend.rs`/`ping_sender.rs` both
operate against a shared `Server` guarded by `parking_lot::RwLock`s,
exactly as here) generalized to this crate's simpler packet set.
*/

pub mod ping_sender;

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::RwLock;

use config::{Config, ADDRESS_EXTRA_BYTES, LCLIENT_LIST, MAX_SENT_NODES};
use crypto_core::*;
use dht::client::{return_ip_is_fresh, PingData};
use dht::friend::FriendList;
use dht::get_nodes_table::GetNodesTable;
use dht::hole_punching;
use dht::kbucket::Bucket;
use dht::packed_node::PackedNode;
use dht::packet::{
    all_same_family, CryptoPacket, DhtPacket, LanDiscovery, NatPingKind, NatPingPayload,
    NodesRequest, NodesRequestPayload, NodesResponse, NodesResponsePayload, PingPayload,
    PingRequest, PingResponse,
};
use dht::to_ping::ToPingQueue;
use ip_port::is_lan;
use rendezvous::packet::RendezvousPacket;
use rendezvous::{select_publish_targets, RendezvousStore};

/// Packets to send and out-of-band notifications produced by handling one
/// datagram or one `tick()`.
#[derive(Default)]
pub struct ServerEvents {
    /// `(destination, packet)` pairs the caller's socket layer should send.
    pub sends: Vec<(SocketAddr, DhtPacket)>,
    /// Rendezvous matches found this round: `(peer_pk, extra_bytes)`.
    pub rendezvous_found: Vec<(PublicKey, [u8; ADDRESS_EXTRA_BYTES])>,
}

impl ServerEvents {
    fn send(&mut self, addr: SocketAddr, packet: DhtPacket) {
        self.sends.push((addr, packet));
    }
}

/// The DHT core: our own identity, the routing tables, and the rendezvous
/// store, all guarded by `parking_lot::RwLock` so a surrounding tokio
/// reactor can share one handle across futures (§5).
pub struct Server {
    /// Our own public key.
    pub pk: PublicKey,
    sk: SecretKey,
    config: Config,
    close_list: RwLock<Bucket>,
    friends: RwLock<FriendList>,
    ping_data: RwLock<HashMap<PublicKey, PingData>>,
    get_nodes_table: RwLock<GetNodesTable>,
    to_ping: RwLock<ToPingQueue>,
    rendezvous: RwLock<RendezvousStore>,
}

impl Server {
    /// A fresh server for the given identity and configuration.
    pub fn new(pk: PublicKey, sk: SecretKey, config: Config) -> Self {
        Server {
            pk,
            sk,
            config,
            close_list: RwLock::new(Bucket::with_capacity(LCLIENT_LIST)),
            friends: RwLock::new(FriendList::new()),
            ping_data: RwLock::new(HashMap::new()),
            get_nodes_table: RwLock::new(GetNodesTable::new()),
            to_ping: RwLock::new(ToPingQueue::with_capacity(::config::MAX_TOPING)),
            rendezvous: RwLock::new(RendezvousStore::new()),
        }
    }

    /// Shared key for talking to `other`.
    fn shared_key(&self, other: &PublicKey) -> PrecomputedKey {
        precompute(other, &self.sk)
    }

    /// Add or refresh `pk`/`saddr` in our own close list and, if `pk` is a
    /// friend, in that friend's client list too - `addto_lists` applied to
    /// both tables on every authenticated packet.
    fn learn(&self, pk: PublicKey, saddr: SocketAddr) {
        self.close_list.write().add_or_update(&self.pk, pk, saddr, self.config.bad_node_timeout);
        let mut friends = self.friends.write();
        if let Some(friend) = friends.get_mut(&pk) {
            friend.add_close_node(pk, saddr, self.config.bad_node_timeout);
        }
    }

    /// Nodes we know of closest to `target`, drawn from both the close
    /// list and every friend's client list (§4.4's k-closest query spans
    /// all tables, not just one).
    fn get_close_nodes(&self, target: &PublicKey) -> Vec<PackedNode> {
        let bad_node_timeout = self.config.bad_node_timeout;
        let mut candidates = self.close_list.read().get_close_nodes(target, LCLIENT_LIST, bad_node_timeout);
        for friend in self.friends.read().iter() {
            candidates.extend(friend.client_list.get_close_nodes(target, LCLIENT_LIST, bad_node_timeout));
        }
        candidates.sort_by(|a, b| xor_cmp(target, &a.pk, &b.pk));
        candidates.dedup_by(|a, b| a.pk == b.pk);
        candidates.truncate(MAX_SENT_NODES);
        candidates
    }

    /// Add `pk`/`saddr` to the to-ping queue (a candidate worth a single
    /// ping before being trusted with a routing-table slot).
    fn queue_to_ping(&self, pk: PublicKey, saddr: SocketAddr) {
        self.to_ping.write().try_add(&self.pk, pk, saddr);
    }

    /// Bootstrap from a known node: sends it a ping and a `GetNodes` for
    /// our own id (§4.5).
    pub fn bootstrap(&self, pk: PublicKey, saddr: SocketAddr) -> ServerEvents {
        let mut events = ServerEvents::default();
        self.send_ping_request(&mut events, pk, saddr);
        self.send_nodes_request(&mut events, pk, saddr, self.pk);
        events
    }

    fn send_ping_request(&self, events: &mut ServerEvents, pk: PublicKey, saddr: SocketAddr) {
        let id = random_u64();
        self.ping_data.write().entry(pk).or_insert_with(PingData::new).set_ping_id(id);
        let shared = self.shared_key(&pk);
        let packet = PingRequest::new(&shared, self.pk, &PingPayload { id });
        events.send(saddr, DhtPacket::PingRequest(packet));
    }

    fn send_nodes_request(&self, events: &mut ServerEvents, pk: PublicKey, saddr: SocketAddr, target: PublicKey) {
        let id = random_u64();
        self.get_nodes_table.write().insert(pk, saddr, id);
        let shared = self.shared_key(&pk);
        let packet = NodesRequest::new(&shared, self.pk, &NodesRequestPayload { id, target });
        events.send(saddr, DhtPacket::NodesRequest(packet));
    }

    /// Handle one inbound datagram already parsed into a `DhtPacket`.
    pub fn handle_packet(&self, from: SocketAddr, packet: DhtPacket) -> ServerEvents {
        let mut events = ServerEvents::default();
        match packet {
            DhtPacket::PingRequest(p) => self.handle_ping_request(&mut events, from, p),
            DhtPacket::PingResponse(p) => self.handle_ping_response(from, p),
            DhtPacket::NodesRequest(p) => self.handle_nodes_request(&mut events, from, p),
            DhtPacket::NodesResponse(p, _) => self.handle_nodes_response(from, p),
            DhtPacket::LanDiscovery(p) => self.handle_lan_discovery(&mut events, from, p),
            DhtPacket::Rendezvous(p) => self.handle_rendezvous(&mut events, from, p),
            DhtPacket::Crypto(p) => self.handle_crypto(&mut events, from, p),
        }
        events
    }

    fn handle_ping_request(&self, events: &mut ServerEvents, from: SocketAddr, p: PingRequest) {
        let shared = self.shared_key(&p.pk);
        let payload = match p.get_payload(&shared) {
            Ok(payload) => payload,
            Err(_) => { debug!(target: "ping_request", "dropping undecryptable PingRequest from {}", from); return; }
        };
        let response = PingResponse::new(&shared, self.pk, &PingPayload { id: payload.id });
        events.send(from, DhtPacket::PingResponse(response));
        self.queue_to_ping(p.pk, from);
    }

    fn handle_ping_response(&self, from: SocketAddr, p: PingResponse) {
        let shared = self.shared_key(&p.pk);
        let payload = match p.get_payload(&shared) {
            Ok(payload) => payload,
            Err(_) => { trace!(target: "ping_response", "dropping undecryptable PingResponse from {}", from); return; }
        };
        let mut table = self.ping_data.write();
        let valid = table.get_mut(&p.pk)
            .map(|entry| entry.check_ping_id(payload.id, self.config.ping_timeout))
            .unwrap_or(false);
        drop(table);
        if valid {
            self.learn(p.pk, from);
        } else {
            trace!(target: "ping_response", "unsolicited PingResponse from {}", from);
        }
    }

    fn handle_nodes_request(&self, events: &mut ServerEvents, from: SocketAddr, p: NodesRequest) {
        let shared = self.shared_key(&p.pk);
        let payload = match p.get_payload(&shared) {
            Ok(payload) => payload,
            Err(_) => { debug!(target: "nodes_request", "dropping undecryptable NodesRequest from {}", from); return; }
        };
        self.learn(p.pk, from);

        let nodes = self.get_close_nodes(&payload.target);
        for chunk_is_v4 in &[true, false] {
            let chunk: Vec<PackedNode> = nodes.iter()
                .filter(|n| (n.ip_port().family() == ::ip_port::Family::V4) == *chunk_is_v4)
                .cloned()
                .collect();
            if chunk.is_empty() {
                continue;
            }
            debug_assert!(all_same_family(&chunk));
            let response = NodesResponse::new(&shared, self.pk, &NodesResponsePayload { id: payload.id, nodes: chunk });
            events.send(from, DhtPacket::NodesResponse(response, *chunk_is_v4));
        }
    }

    fn handle_nodes_response(&self, from: SocketAddr, p: NodesResponse) {
        let shared = self.shared_key(&p.pk);
        let payload = match p.get_payload(&shared) {
            Ok(payload) => payload,
            Err(_) => { debug!(target: "nodes_response", "dropping undecryptable NodesResponse from {}", from); return; }
        };
        let solicited = self.get_nodes_table.write().check(&p.pk, from, payload.id, self.config.ping_timeout);
        if !solicited {
            trace!(target: "nodes_response", "unsolicited NodesResponse from {}", from);
            return;
        }

        self.learn(p.pk, from);
        for node in &payload.nodes {
            self.queue_to_ping(node.pk, node.saddr);

            if node.pk == self.pk {
                self.close_list.write().record_return_ip(&p.pk, node.saddr);
            }
            let mut friends = self.friends.write();
            for friend in friends.iter_mut() {
                if node.pk == friend.pk {
                    friend.client_list.record_return_ip(&p.pk, node.saddr);
                }
            }
        }
    }

    fn handle_lan_discovery(&self, events: &mut ServerEvents, from: SocketAddr, p: LanDiscovery) {
        let _ = events;
        if is_lan(&from.ip()) {
            self.queue_to_ping(p.pk, from);
        }
    }

    fn handle_rendezvous(&self, events: &mut ServerEvents, from: SocketAddr, p: RendezvousPacket) {
        let outcome = self.rendezvous.write().handle_packet(from, p, &self.config);
        for (addr, packet) in outcome.forwards {
            events.send(addr, DhtPacket::Rendezvous(packet));
        }
        events.rendezvous_found.extend(outcome.found);
    }

    fn handle_crypto(&self, events: &mut ServerEvents, from: SocketAddr, p: CryptoPacket) {
        let shared = self.shared_key(&p.pk);
        let payload = match p.decrypt_nat_ping(&shared) {
            Ok(payload) => payload,
            Err(_) => { trace!(target: "hole_punching", "dropping non-NAT-ping CryptoPacket from {}", from); return; }
        };

        let mut friends = self.friends.write();
        let friend = match friends.get_mut(&p.pk) {
            Some(f) => f,
            None => return,
        };

        match payload.kind {
            NatPingKind::Request => {
                friend.hole_punching.handle_ping_request();
                let response = CryptoPacket::new_nat_ping(&shared, self.pk, &NatPingPayload { kind: NatPingKind::Response, id: payload.id });
                events.send(from, DhtPacket::Crypto(response));
            }
            NatPingKind::Response => {
                friend.hole_punching.handle_ping_response(payload.id);
            }
        }
    }

    /// Start publishing under `unspecific`, recording our own id so a
    /// matching incoming packet is recognized as the other side. `extra`
    /// (`nospam || checksum`) rides along in the outgoing packet so a
    /// finder can recover it.
    pub fn rendezvous_publish(&self, unspecific: [u8; 32], extra: [u8; ADDRESS_EXTRA_BYTES]) {
        self.rendezvous.write().start_publishing(unspecific, self.pk, extra);
    }

    /// Add `pk` as a friend, unless already present (§3's friend list).
    pub fn add_friend(&self, pk: PublicKey) -> bool {
        self.friends.write().add(pk)
    }

    /// Remove a friend entirely, discarding its client list and NAT state.
    pub fn remove_friend(&self, pk: &PublicKey) -> bool {
        self.friends.write().remove(pk)
    }

    /// Seed our own close list with a node restored from persisted state or
    /// learned out of band (e.g. a configured bootstrap address), without
    /// waiting for a ping round trip first.
    pub fn seed_close_node(&self, node: PackedNode) {
        self.close_list.write().add_or_update(&self.pk, node.pk, node.saddr, self.config.bad_node_timeout);
    }

    /// Serialize the friend list and close list into the persisted layout
    /// (§4.9/§6), ready to write to a state file.
    pub fn save_state(&self) -> Vec<u8> {
        ::persistence::save(&self.friends.read(), &self.close_list.read())
    }

    /// Re-seed from a previously persisted state: every saved friend is
    /// re-added and every saved close-list node is re-seeded, matching
    /// `load`'s "liveness resets to just learned" contract (§4.9).
    pub fn load_state(&self, loaded: ::persistence::LoadedState) {
        for pk in loaded.friends {
            self.add_friend(pk);
        }
        for node in loaded.close_nodes {
            self.seed_close_node(node);
        }
    }

    /// Drive every periodic subsystem for one tick, in the fixed order
    /// required by §4.8: close-list maintenance, friend-list maintenance,
    /// NAT punching, to-ping queue, rendezvous.
    pub fn tick(&self) -> ServerEvents {
        let mut events = ServerEvents::default();
        self.do_close(&mut events);
        self.do_friends(&mut events);
        self.do_nat(&mut events);
        self.do_toping(&mut events);
        self.do_rendezvous(&mut events);
        events
    }

    fn do_close(&self, events: &mut ServerEvents) {
        let due = {
            let close_list = self.close_list.read();
            ping_sender::due_close_pings(&close_list, self.config.ping_interval, self.config.kill_node_timeout)
        };
        for target in due {
            self.send_ping_request(events, target.pk, target.saddr);
            self.close_list.write().mark_pinged(&target.pk);
        }
        self.close_list.write().remove_dead(self.config.kill_node_timeout);

        if let Some(target) = self.random_good_close_entry() {
            self.send_nodes_request(events, target.pk, target.saddr, self.pk);
        }
    }

    fn do_friends(&self, events: &mut ServerEvents) {
        let due = {
            let friends = self.friends.read();
            ping_sender::due_friend_pings(&friends, self.config.ping_interval, self.config.kill_node_timeout)
        };
        for target in due {
            self.send_ping_request(events, target.pk, target.saddr);
            let mut friends = self.friends.write();
            for friend in friends.iter_mut() {
                friend.client_list.mark_pinged(&target.pk);
            }
        }

        let get_node_interval = self.config.get_node_interval;
        let bad_node_timeout = self.config.bad_node_timeout;
        let mut friends = self.friends.write();
        for friend in friends.iter_mut() {
            friend.client_list.remove_dead(self.config.kill_node_timeout);
            if friend.should_request_nodes(get_node_interval) {
                if let Some(entry) = friend.client_list.good_entries(bad_node_timeout).into_iter().next() {
                    let (pk, saddr, target) = (entry.pk, entry.saddr, friend.pk);
                    friend.mark_requested();
                    self.send_nodes_request(events, pk, saddr, target);
                }
            }
        }
    }

    fn do_nat(&self, events: &mut ServerEvents) {
        let punch_interval = self.config.punch_interval;
        let bad_node_timeout = self.config.bad_node_timeout;
        let mut friends = self.friends.write();
        for friend in friends.iter_mut() {
            if !friend.has_enough_clients_for_punching() {
                continue;
            }

            // `friend_iplist`'s `ret_ip_port` filter: a return-ip report
            // older than `bad_node_timeout` is as stale as the client
            // entry itself and can't corroborate a punch guess.
            let reporting: Vec<(PublicKey, SocketAddr, SocketAddr)> = friend.client_list.iter()
                .filter_map(|c| c.return_ip.and_then(|r| {
                    if return_ip_is_fresh(r.received_at, bad_node_timeout) {
                        Some((c.pk, c.saddr, r.addr))
                    } else {
                        None
                    }
                }))
                .collect();

            if reporting.len() >= ::config::MAX_FRIEND_CLIENTS / 2 && friend.hole_punching.should_send_ping(punch_interval) {
                let id = friend.hole_punching.send_ping();
                let shared = self.shared_key(&friend.pk);
                for &(_, relay_addr, _) in &reporting {
                    let packet = CryptoPacket::new_nat_ping(&shared, self.pk, &NatPingPayload { kind: NatPingKind::Request, id });
                    events.send(relay_addr, DhtPacket::Crypto(packet));
                }
            }

            if friend.hole_punching.ready_to_punch(punch_interval) {
                let observed: Vec<SocketAddr> = reporting.iter().map(|&(_, _, addr)| addr).collect();
                if let Some(ip) = hole_punching::common_ip(&observed, ::config::MAX_FRIEND_CLIENTS / 2) {
                    let ports = hole_punching::ports_for_ip(&observed, ip);
                    let guesses = hole_punching::punch_holes(ip, &ports, friend.hole_punching.punching_index);
                    friend.hole_punching.punching_index = friend.hole_punching.punching_index.wrapping_add(guesses.len() as u32);
                    let shared = self.shared_key(&friend.pk);
                    for addr in guesses {
                        let id = random_u64();
                        let packet = PingRequest::new(&shared, self.pk, &PingPayload { id });
                        events.send(addr, DhtPacket::PingRequest(packet));
                    }
                    friend.hole_punching.mark_punched();
                    friend.hole_punching.hole_punching = false;
                }
            }
        }
    }

    fn do_toping(&self, events: &mut ServerEvents) {
        let due = self.to_ping.read().is_due(self.config.time_toping);
        if !due {
            return;
        }
        let drained = self.to_ping.write().drain();
        for (pk, saddr) in drained {
            self.send_ping_request(events, pk, saddr);
        }
    }

    fn do_rendezvous(&self, events: &mut ServerEvents) {
        let mut rendezvous = self.rendezvous.write();

        let forwards = rendezvous.tick(&self.config);
        for (addr, packet) in forwards {
            events.send(addr, DhtPacket::Rendezvous(packet));
        }

        // `publish()`: walk every candidate close to our own `unspecific`
        // half and fan the publish packet out to the closest few, same as
        // a `NodesRequest` target set.
        if let Some(unspecific) = rendezvous.publish_target() {
            if let Some(packet) = rendezvous.due_publish_packet(&self.config) {
                let mut candidates = self.all_good_nodes();
                for target in select_publish_targets(&mut candidates, &unspecific) {
                    events.send(target.saddr, DhtPacket::Rendezvous(packet));
                }
            }
        }
    }

    /// Every good close-list and friend-client-list node, the shared
    /// candidate pool for rendezvous publish fan-out (`rendezvous.c`'s
    /// `publish()` walks close nodes and friends alike).
    fn all_good_nodes(&self) -> Vec<PackedNode> {
        let bad_node_timeout = self.config.bad_node_timeout;
        let mut nodes: Vec<PackedNode> = self.close_list.read().good_entries(bad_node_timeout)
            .into_iter()
            .map(|c| PackedNode::new(c.pk, c.saddr))
            .collect();
        for friend in self.friends.read().iter() {
            nodes.extend(friend.good_client_addrs(bad_node_timeout));
        }
        nodes
    }

    fn random_good_close_entry(&self) -> Option<PackedNode> {
        let close_list = self.close_list.read();
        let good = close_list.good_entries(self.config.bad_node_timeout);
        if good.is_empty() {
            return None;
        }
        let idx = (random_u32() as usize) % good.len();
        Some(good[idx].to_packed_node())
    }
}

fn xor_cmp(pivot: &PublicKey, a: &PublicKey, b: &PublicKey) -> ::std::cmp::Ordering {
    for i in 0..32 {
        let xa = a.0[i] ^ pivot.0[i];
        let xb = b.0[i] ^ pivot.0[i];
        if xa != xb {
            return xa.cmp(&xb);
        }
    }
    ::std::cmp::Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_then_ping_learns_node() {
        let config = Config::default();
        let (pk_a, sk_a) = gen_keypair();
        let (pk_b, sk_b) = gen_keypair();
        let server_a = Server::new(pk_a, sk_a, config);
        let server_b = Server::new(pk_b, sk_b, config);

        let addr_b: SocketAddr = "127.0.0.1:2".parse().unwrap();
        let addr_a: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let events = server_a.bootstrap(pk_b, addr_b);
        assert_eq!(events.sends.len(), 2);

        let mut reply_events = ServerEvents::default();
        for (_, packet) in events.sends {
            let r = server_b.handle_packet(addr_a, packet);
            reply_events.sends.extend(r.sends);
        }
        assert!(!reply_events.sends.is_empty());

        for (_, packet) in reply_events.sends {
            server_a.handle_packet(addr_b, packet);
        }

        assert!(server_a.close_list.read().find(&pk_b).is_some());
    }

    #[test]
    fn rendezvous_publish_fans_out_to_close_nodes() {
        let config = Config::default();
        let (pk_a, sk_a) = gen_keypair();
        let server_a = Server::new(pk_a, sk_a, config);

        let (target_pk, _) = gen_keypair();
        let target_addr: SocketAddr = "127.0.0.1:7".parse().unwrap();
        server_a.seed_close_node(PackedNode::new(target_pk, target_addr));

        server_a.rendezvous_publish([1u8; 32], [2u8; 6]);

        let mut events = ServerEvents::default();
        server_a.do_rendezvous(&mut events);

        assert_eq!(events.sends.len(), 1);
        assert_eq!(events.sends[0].0, target_addr);
        match events.sends[0].1 {
            DhtPacket::Rendezvous(ref packet) => assert_eq!(packet.unspecific, [1u8; 32]),
            _ => panic!("expected a Rendezvous packet"),
        }

        // Until `rendezvous_send_again` elapses again, no further publish
        // should go out.
        let mut second = ServerEvents::default();
        server_a.do_rendezvous(&mut second);
        assert!(second.sends.is_empty());
    }

    #[test]
    fn unsolicited_nodes_response_does_not_mutate_state() {
        let config = Config::default();
        let (pk_a, sk_a) = gen_keypair();
        let server_a = Server::new(pk_a, sk_a, config);
        let (pk_b, sk_b) = gen_keypair();

        let shared = precompute(&pk_a, &sk_b);
        let payload = NodesResponsePayload { id: 999, nodes: Vec::new() };
        let packet = NodesResponse::new(&shared, pk_b, &payload);

        let before = server_a.close_list.read().len();
        server_a.handle_packet("127.0.0.1:9".parse().unwrap(), DhtPacket::NodesResponse(packet, true));
        assert_eq!(server_a.close_list.read().len(), before);
    }
}
