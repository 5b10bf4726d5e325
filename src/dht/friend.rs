/*! `FriendEntry`/`FriendList`: the friends we actively want to stay
connected to, each with its own client list and NAT punching state.
Adapted from the teacher's `DhtFriend` (`toxcore/dht/dht_friend.rs`),
generalized from its `close_nodes`/`bootstrap_nodes` split (which exists
to support the teacher's onion-announce bootstrap path, out of scope here)
down to the single client list named in §3.
*/

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use config::{Config, MAX_FRIEND_CLIENTS};
use crypto_core::PublicKey;
use dht::hole_punching::HolePunching;
use dht::kbucket::Bucket;
use dht::packed_node::PackedNode;

/// One entry in the friend list: the friend's id, the client list of
/// nodes we believe are close to them, and their NAT punching state.
pub struct FriendEntry {
    /// The friend's public key.
    pub pk: PublicKey,
    /// Nodes close to the friend's id, maintained the same way the DHT's
    /// own close list is (§3, `MAX_FRIEND_CLIENTS` entries).
    pub client_list: Bucket,
    /// NAT hole-punching state for this friend (§4.6).
    pub hole_punching: HolePunching,
    /// Last time we sent a `NodesRequest` seeking this friend's id.
    pub last_getnodes_time: Instant,
}

impl FriendEntry {
    /// A freshly added friend, with an empty client list.
    pub fn new(pk: PublicKey) -> Self {
        FriendEntry {
            pk,
            client_list: Bucket::with_capacity(MAX_FRIEND_CLIENTS),
            hole_punching: HolePunching::new(),
            last_getnodes_time: Instant::now(),
        }
    }

    /// Feed a discovered node into this friend's client list, using the
    /// friend's own id as the distance pivot (`addto_lists` applies the
    /// close-list insertion policy to friend lists too).
    pub fn add_close_node(&mut self, pk: PublicKey, saddr: SocketAddr, bad_node_timeout: Duration) -> bool {
        let pivot = self.pk;
        self.client_list.add_or_update(&pivot, pk, saddr, bad_node_timeout)
    }

    /// `true` once `get_node_interval` has elapsed since our last
    /// `NodesRequest` seeking this friend.
    pub fn should_request_nodes(&self, get_node_interval: Duration) -> bool {
        self.last_getnodes_time.elapsed() >= get_node_interval
    }

    /// Record that we just sent a `NodesRequest` for this friend.
    pub fn mark_requested(&mut self) {
        self.last_getnodes_time = Instant::now();
    }

    /// Addresses of every good client-list entry, used both to pick a
    /// `NodesRequest` destination and as `rendezvous.rs`'s publish
    /// fan-out source (`rendezvous.c`'s `publish()` walks exactly this
    /// list for every friend).
    pub fn good_client_addrs(&self, bad_node_timeout: Duration) -> Vec<PackedNode> {
        self.client_list.good_entries(bad_node_timeout)
            .into_iter()
            .map(|c| PackedNode::new(c.pk, c.saddr))
            .collect()
    }

    /// `true` once the client list has at least half its capacity filled -
    /// `do_NAT`'s gate on attempting NAT punching at all (`num <
    /// MAX_FRIEND_CLIENTS/2` skips punching as premature).
    pub fn has_enough_clients_for_punching(&self) -> bool {
        self.client_list.len() >= MAX_FRIEND_CLIENTS / 2
    }
}

/// The set of friends we're trying to stay connected to.
pub struct FriendList {
    friends: Vec<FriendEntry>,
}

impl FriendList {
    /// An empty friend list.
    pub fn new() -> Self {
        FriendList { friends: Vec::new() }
    }

    /// Add `pk` as a friend, unless already present. Returns `false` if
    /// `pk` was already a friend.
    pub fn add(&mut self, pk: PublicKey) -> bool {
        if self.friends.iter().any(|f| f.pk == pk) {
            return false;
        }
        self.friends.push(FriendEntry::new(pk));
        true
    }

    /// Remove a friend entirely, discarding their client list and NAT
    /// state.
    pub fn remove(&mut self, pk: &PublicKey) -> bool {
        let before = self.friends.len();
        self.friends.retain(|f| &f.pk != pk);
        self.friends.len() != before
    }

    /// Look up a friend by id.
    pub fn get(&self, pk: &PublicKey) -> Option<&FriendEntry> {
        self.friends.iter().find(|f| &f.pk == pk)
    }

    /// Mutable lookup, used by packet handlers updating client lists and
    /// NAT state.
    pub fn get_mut(&mut self, pk: &PublicKey) -> Option<&mut FriendEntry> {
        self.friends.iter_mut().find(|f| &f.pk == pk)
    }

    /// `true` if `pk` is one of our friends.
    pub fn contains(&self, pk: &PublicKey) -> bool {
        self.friends.iter().any(|f| &f.pk == pk)
    }

    /// Iterate over all friends.
    pub fn iter(&self) -> ::std::slice::Iter<FriendEntry> {
        self.friends.iter()
    }

    /// Mutable iteration, used by `Server::do_friends`/`do_nat` to drive
    /// each friend's periodic maintenance.
    pub fn iter_mut(&mut self) -> ::std::slice::IterMut<FriendEntry> {
        self.friends.iter_mut()
    }

    /// Number of friends.
    pub fn len(&self) -> usize {
        self.friends.len()
    }

    /// `true` if there are no friends.
    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }
}

impl Default for FriendList {
    fn default() -> Self {
        FriendList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    #[test]
    fn add_is_idempotent() {
        let mut list = FriendList::new();
        let pk = gen_keypair().0;
        assert!(list.add(pk));
        assert!(!list.add(pk));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_drops_entry() {
        let mut list = FriendList::new();
        let pk = gen_keypair().0;
        list.add(pk);
        assert!(list.remove(&pk));
        assert!(!list.contains(&pk));
    }

    #[test]
    fn enough_clients_gate_follows_capacity_half() {
        let config = Config::default();
        let mut friend = FriendEntry::new(gen_keypair().0);
        assert!(!friend.has_enough_clients_for_punching());
        for i in 0..(MAX_FRIEND_CLIENTS / 2) {
            let addr = format!("127.0.0.1:{}", i + 1).parse().unwrap();
            friend.add_close_node(gen_keypair().0, addr, config.bad_node_timeout);
        }
        assert!(friend.has_enough_clients_for_punching());
    }
}
