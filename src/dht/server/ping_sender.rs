/*! Picks which close-list and friend-client-list entries are due for a
ping this tick. Adapted from the teacher's `toxcore/dht/server/ping_sender.rs`
(`PingSender::{can_send_pings, try_add, send_pings}`), generalized from its
single `nodes_to_send_ping: Bucket` staging area to operate directly over
`Server`'s close list and friend lists since this crate has no separate
onion-announce bootstrap path to stage pings for.
*/

use std::time::Duration;

use crypto_core::PublicKey;
use dht::friend::FriendList;
use dht::kbucket::Bucket;

/// One outstanding ping to send: the target and the address to send it to.
pub struct PingTarget {
    /// Target node id.
    pub pk: PublicKey,
    /// Address to send the ping to.
    pub saddr: ::std::net::SocketAddr,
}

/// Entries in `close_list` whose `last_pinged` is at least `ping_interval`
/// old, excluding dead entries (which periodic maintenance should be
/// dropping anyway, not pinging).
pub fn due_close_pings(close_list: &Bucket, ping_interval: Duration, kill_node_timeout: Duration) -> Vec<PingTarget> {
    close_list.iter()
        .filter(|c| !c.is_dead(kill_node_timeout))
        .filter(|c| c.last_pinged.elapsed() >= ping_interval)
        .map(|c| PingTarget { pk: c.pk, saddr: c.saddr })
        .collect()
}

/// Same, but across every friend's client list.
pub fn due_friend_pings(friends: &FriendList, ping_interval: Duration, kill_node_timeout: Duration) -> Vec<PingTarget> {
    friends.iter()
        .flat_map(|f| f.client_list.iter())
        .filter(|c| !c.is_dead(kill_node_timeout))
        .filter(|c| c.last_pinged.elapsed() >= ping_interval)
        .map(|c| PingTarget { pk: c.pk, saddr: c.saddr })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Config;
    use crypto_core::gen_keypair;

    #[test]
    fn freshly_inserted_entry_is_not_yet_due() {
        let config = Config::default();
        let mut bucket = Bucket::with_capacity(4);
        bucket.add_or_update(&gen_keypair().0, gen_keypair().0, "127.0.0.1:1".parse().unwrap(), config.bad_node_timeout);
        let due = due_close_pings(&bucket, config.ping_interval, config.kill_node_timeout);
        assert!(due.is_empty());
    }

    #[test]
    fn instant_config_makes_every_entry_due() {
        let config = Config::instant();
        let mut bucket = Bucket::with_capacity(4);
        bucket.add_or_update(&gen_keypair().0, gen_keypair().0, "127.0.0.1:1".parse().unwrap(), config.bad_node_timeout);
        let due = due_close_pings(&bucket, config.ping_interval, config.kill_node_timeout);
        assert_eq!(due.len(), 1);
    }
}
