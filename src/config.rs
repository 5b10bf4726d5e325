/*! Timing constants and their override surface.

The teacher's `dht::server::ConfigArgs`/`Server::set_config_values` let
tests shrink every timeout to zero so a single `tick()` exercises a code
path that would otherwise take minutes to fire. `Config` plays the same
role here, but also doubles as what the `driftnet-node` binary builds
from CLI flags - there is no second, parallel "real" config type.
*/

use std::time::Duration;

/// All of the timing knobs named in the data model (§3) and component
/// design (§4), gathered so a `Server` can be constructed once with
/// production defaults and tests can override individual fields.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Age at which a client entry becomes *bad* (§3).
    pub bad_node_timeout: Duration,
    /// Age at which a client entry becomes *dead* and is discarded (§3).
    pub kill_node_timeout: Duration,
    /// How long an outstanding ping id stays valid (§4.3).
    pub ping_timeout: Duration,
    /// Minimum spacing between pings to the same close-list entry (§4.5).
    pub ping_interval: Duration,
    /// Minimum spacing between `GetNodes` requests for our own id (§4.5).
    pub get_node_interval: Duration,
    /// Minimum spacing between `NAT_PING_REQUEST`s for one friend (§4.6).
    pub punch_interval: Duration,
    /// How long a to-ping queue candidate waits before being pinged and
    /// evicted (§3).
    pub time_toping: Duration,
    /// Length of one rendezvous epoch; publish timestamps are rounded down
    /// to a multiple of this (§4.7).
    pub rendezvous_interval: Duration,
    /// Minimum spacing between re-forwarding a matched rendezvous pair
    /// (§4.7).
    pub rendezvous_send_again: Duration,
    /// How long a rendezvous store slot blocks further unconditional
    /// stores after accepting one (§4.7).
    pub rendezvous_store_block: Duration,
}

/// The number of slots in the close list (§3, `LCLIENT_LIST`).
pub const LCLIENT_LIST: usize = 32;
/// The number of client-list slots tracked per friend (§3).
pub const MAX_FRIEND_CLIENTS: usize = 8;
/// The maximum number of nodes returned by a `get_close_nodes` query (§4.4).
pub const MAX_SENT_NODES: usize = 8;
/// Capacity of the outstanding get-nodes table (§3).
pub const MAX_GETNODES_TABLE: usize = 32;
/// Capacity of the to-ping queue (§3).
pub const MAX_TOPING: usize = 16;
/// Width of the NAT hole-punching port-guess window (§4.6).
pub const MAX_PUNCHING_PORTS: u32 = 32;
/// Number of rendezvous store slots (§3).
pub const RENDEZVOUS_STORE_SIZE: usize = 8;
/// `nospam || checksum` length XORed into the rendezvous specific hash (§4.7).
pub const ADDRESS_EXTRA_BYTES: usize = 6;
/// Minimum accepted passphrase length for a rendezvous publish (§4.7).
pub const RENDEZVOUS_PASSPHRASE_MINLEN: usize = 1;
/// Conventional UDP port for a bootstrap/DHT node.
pub const DEFAULT_PORT: u16 = 33445;

impl Default for Config {
    fn default() -> Self {
        Config {
            bad_node_timeout: Duration::from_secs(70),
            kill_node_timeout: Duration::from_secs(300),
            ping_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(60),
            get_node_interval: Duration::from_secs(20),
            punch_interval: Duration::from_secs(10),
            time_toping: Duration::from_secs(5),
            rendezvous_interval: Duration::from_secs(60 * 60),
            rendezvous_send_again: Duration::from_secs(45),
            rendezvous_store_block: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// A config with every duration set to zero, for tests that want a
    /// periodic task to fire unconditionally on the next `tick()`.
    pub fn instant() -> Self {
        Config {
            bad_node_timeout: Duration::from_secs(0),
            kill_node_timeout: Duration::from_secs(0),
            ping_timeout: Duration::from_secs(0),
            ping_interval: Duration::from_secs(0),
            get_node_interval: Duration::from_secs(0),
            punch_interval: Duration::from_secs(0),
            time_toping: Duration::from_secs(0),
            rendezvous_interval: Duration::from_secs(1),
            rendezvous_send_again: Duration::from_secs(0),
            rendezvous_store_block: Duration::from_secs(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = Config::default();
        assert_eq!(config.bad_node_timeout, Duration::from_secs(70));
        assert_eq!(config.kill_node_timeout, Duration::from_secs(300));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(60));
        assert_eq!(config.get_node_interval, Duration::from_secs(20));
        assert_eq!(config.punch_interval, Duration::from_secs(10));
        assert_eq!(config.time_toping, Duration::from_secs(5));
    }
}
