/*! NAT hole punching: per-friend state tracking a `NAT_PING_REQUEST`/
`_RESPONSE` round trip and the port-guessing heuristic used once a friend's
close nodes report enough corroborating addresses. Grounded in full on
`DHT.c`'s `send_NATping`/`handle_NATping`/`NAT_commonip`/`NAT_getports`/
`punch_holes`/`do_NAT`; the teacher references the resulting `HolePunching`
struct from `dht_friend.rs` without the pack including its own source, so
the fields here are reconstructed from that usage plus the original C.
*/

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use config::MAX_PUNCHING_PORTS;
use crypto_core::random_u64;

/// Per-friend NAT traversal state, advancing idle -> ping sent -> response
/// received -> punching as the `do_NAT` cadence drives it.
#[derive(Clone)]
pub struct HolePunching {
    nat_ping_id: u64,
    nat_ping_timestamp: Instant,
    recv_nat_ping_timestamp: Option<Instant>,
    /// When we last attempted a `punch_holes` sweep for this friend, if
    /// ever (`do_NAT`'s `punching_timestamp`).
    punching_timestamp: Option<Instant>,
    /// Set once a `NAT_PING_RESPONSE` matching our outstanding id arrives;
    /// cleared again after `punch_holes` has been attempted.
    pub hole_punching: bool,
    /// Current offset into the `MAX_PUNCHING_PORTS`-wide guess window,
    /// advanced by one each time `punch_holes` runs so repeated attempts
    /// sweep new candidate ports instead of repeating the same guesses.
    pub punching_index: u32,
}

impl HolePunching {
    /// Fresh, idle state - as if we've never attempted to punch for this
    /// friend.
    pub fn new() -> Self {
        let now = Instant::now();
        HolePunching {
            nat_ping_id: 0,
            nat_ping_timestamp: now,
            recv_nat_ping_timestamp: None,
            punching_timestamp: None,
            hole_punching: false,
            punching_index: 0,
        }
    }

    /// `true` once `punch_interval` has elapsed since our last
    /// `NAT_PING_REQUEST` for this friend (`do_NAT`'s send-timing gate).
    pub fn should_send_ping(&self, punch_interval: Duration) -> bool {
        self.nat_ping_timestamp.elapsed() >= punch_interval
    }

    /// Generate and record a fresh outstanding ping id, returning it so
    /// the caller can put it in the `NAT_PING_REQUEST` payload.
    pub fn send_ping(&mut self) -> u64 {
        let id = random_u64();
        self.nat_ping_id = id;
        self.nat_ping_timestamp = Instant::now();
        id
    }

    /// Handle an inbound `NAT_PING_REQUEST`: always reply with the same id
    /// (matching `handle_NATping`'s request branch) and remember that we
    /// heard from this friend, for corroboration purposes.
    pub fn handle_ping_request(&mut self) {
        self.recv_nat_ping_timestamp = Some(Instant::now());
    }

    /// Handle an inbound `NAT_PING_RESPONSE`. If `id` matches our
    /// outstanding request, mark this friend ready for hole punching and
    /// roll over to a fresh id, matching `handle_NATping`'s response
    /// branch (it always regenerates `NATping_id` on a valid response).
    pub fn handle_ping_response(&mut self, id: u64) -> bool {
        if id == self.nat_ping_id {
            self.hole_punching = true;
            self.nat_ping_id = random_u64();
            true
        } else {
            false
        }
    }

    /// `true` iff every `do_NAT` punch gate is satisfied: a
    /// `NAT_PING_RESPONSE` set `hole_punching` and it hasn't been cleared
    /// yet, our last punch attempt for this friend (if any) is at least
    /// `punch_interval` old, and the friend answered a `NAT_PING_REQUEST`
    /// recently enough (within `punch_interval * 2`, matching `do_NAT`'s
    /// `recvNATping_timestamp + PUNCH_INTERVAL * 2 >= temp_time`) to still
    /// be worth punching toward.
    pub fn ready_to_punch(&self, punch_interval: Duration) -> bool {
        if !self.hole_punching {
            return false;
        }
        let punching_stale = self.punching_timestamp
            .map(|t| t.elapsed() >= punch_interval)
            .unwrap_or(true);
        let recv_recent = self.recv_nat_ping_timestamp
            .map(|t| t.elapsed() < punch_interval * 2)
            .unwrap_or(false);
        punching_stale && recv_recent
    }

    /// Record that we just ran a `punch_holes` sweep for this friend.
    pub fn mark_punched(&mut self) {
        self.punching_timestamp = Some(Instant::now());
    }
}

impl Default for HolePunching {
    fn default() -> Self {
        HolePunching::new()
    }
}

/// The IP, if any, reported by at least `min_num` of `addrs` - the quorum
/// vote `NAT_commonip` runs before attempting a punch, so a single
/// mischievous or stale node can't steer the guess.
pub fn common_ip(addrs: &[SocketAddr], min_num: usize) -> Option<IpAddr> {
    let mut counts: HashMap<IpAddr, usize> = HashMap::new();
    for addr in addrs {
        *counts.entry(addr.ip()).or_insert(0) += 1;
    }
    counts.into_iter().filter(|&(_, n)| n >= min_num).map(|(ip, _)| ip).next()
}

/// Every port reported alongside `ip` in `addrs` (`NAT_getports`).
pub fn ports_for_ip(addrs: &[SocketAddr], ip: IpAddr) -> Vec<u16> {
    addrs.iter().filter(|a| a.ip() == ip).map(|a| a.port()).collect()
}

/// The next `MAX_PUNCHING_PORTS` port guesses for `ip`, advancing from
/// `punching_index`, following the exact heuristic in `punch_holes`:
/// `port_list[(i/2) % numports] + (i/(2*numports)) * (if i is odd { -1 }
/// else { 1 })`, which walks slightly above and below each observed port
/// as `i` grows, covering symmetric and nearly-symmetric NATs.
pub fn punch_holes(ip: IpAddr, port_list: &[u16], punching_index: u32) -> Vec<SocketAddr> {
    if port_list.is_empty() {
        return Vec::new();
    }
    let numports = port_list.len() as u32;
    (0..MAX_PUNCHING_PORTS)
        .filter_map(|offset| {
            let i = punching_index + offset;
            let base = port_list[((i / 2) % numports) as usize] as i32;
            let delta = (i / (2 * numports)) as i32;
            let delta = if i % 2 == 1 { -delta } else { delta };
            let port = base + delta;
            if port > 0 && port <= u16::max_value() as i32 {
                Some(SocketAddr::new(ip, port as u16))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(ip: &str, port: u16) -> SocketAddr {
        format!("{}:{}", ip, port).parse().unwrap()
    }

    #[test]
    fn ping_round_trip_sets_hole_punching() {
        let mut hp = HolePunching::new();
        let id = hp.send_ping();
        assert!(!hp.hole_punching);
        assert!(hp.handle_ping_response(id));
        assert!(hp.hole_punching);
    }

    #[test]
    fn stale_response_id_is_ignored() {
        let mut hp = HolePunching::new();
        hp.send_ping();
        assert!(!hp.handle_ping_response(999));
        assert!(!hp.hole_punching);
    }

    #[test]
    fn common_ip_requires_quorum() {
        let addrs = vec![addr("1.2.3.4", 10), addr("1.2.3.4", 11), addr("5.6.7.8", 12)];
        assert_eq!(common_ip(&addrs, 2), Some("1.2.3.4".parse().unwrap()));
        assert_eq!(common_ip(&addrs, 3), None);
    }

    #[test]
    fn punch_holes_covers_window_around_observed_ports() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let guesses = punch_holes(ip, &[1000, 2000], 0);
        assert_eq!(guesses.len(), MAX_PUNCHING_PORTS as usize);
        assert!(guesses.iter().any(|a| a.port() == 1000));
        assert!(guesses.iter().any(|a| a.port() == 2000));
    }
}
