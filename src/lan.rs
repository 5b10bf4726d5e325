/*! LAN discovery broadcast targets (§4.5): enumerate the local interface
list via `get_if_addrs` (matching the teacher's own dependency choice for
this exact purpose) and compute each interface's IPv4 broadcast address,
so a node with no bootstrap list can still find peers on the same subnet.
*/

use std::net::{Ipv4Addr, SocketAddr};

use get_if_addrs::{get_if_addrs, IfAddr};

/// The broadcast address of every non-loopback IPv4 interface on this
/// host, at `port`. IPv6 has no broadcast address; LAN discovery over
/// IPv6 would need multicast, which the original protocol doesn't use
/// either, so this only covers IPv4 interfaces.
pub fn broadcast_addrs(port: u16) -> Vec<SocketAddr> {
    let interfaces = match get_if_addrs() {
        Ok(ifaces) => ifaces,
        Err(_) => return Vec::new(),
    };

    interfaces.into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            IfAddr::V4(v4) => broadcast_of(v4.ip, v4.netmask).map(|b| SocketAddr::new(b.into(), port)),
            IfAddr::V6(_) => None,
        })
        .collect()
}

fn broadcast_of(ip: Ipv4Addr, netmask: Ipv4Addr) -> Option<Ipv4Addr> {
    let ip_bits = u32::from(ip);
    let mask_bits = u32::from(netmask);
    if mask_bits == 0 {
        return None;
    }
    Some(Ipv4Addr::from(ip_bits | !mask_bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_of_class_c_subnet() {
        let ip: Ipv4Addr = "192.168.1.42".parse().unwrap();
        let mask: Ipv4Addr = "255.255.255.0".parse().unwrap();
        assert_eq!(broadcast_of(ip, mask), Some("192.168.1.255".parse().unwrap()));
    }

    #[test]
    fn zero_netmask_yields_no_broadcast() {
        let ip: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let mask: Ipv4Addr = "0.0.0.0".parse().unwrap();
        assert_eq!(broadcast_of(ip, mask), None);
    }
}
