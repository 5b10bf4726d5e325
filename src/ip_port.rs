/*! Dual-stack network address type.

The teacher keeps IP family handling inline in `PackedNode`/`sort_list`
(`dht.rs`); this module pulls it out into one `IpPort` type so both the
packed-node wire format and the close-list's dual-stack displacement rule
(§4.4) share one "what family is this really" answer, including the
IPv4-in-IPv6 canonicalization the DHT routing table depends on.
*/

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use byteorder::{BigEndian, ByteOrder};

use binary_io::*;

/// Address family tag, independent of whether the address is embedded
/// IPv4-in-IPv6.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Family {
    /// IPv4.
    V4,
    /// IPv6, and not an embedded IPv4 address.
    V6,
}

/// A `SocketAddr` that remembers whether it arrived in bare-IPv4 or
/// IPv6 wire form, used to pick the right `SEND_NODES_IPV4`/`_IPV6` shape
/// when relaying a node back out.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IpPort {
    addr: SocketAddr,
}

impl IpPort {
    /// Wrap a `SocketAddr`, canonicalizing an embedded IPv4-in-IPv6 address
    /// down to plain IPv4 as the ingress path is required to (§3).
    pub fn new(addr: SocketAddr) -> Self {
        IpPort { addr: canonicalize(addr) }
    }

    /// The underlying socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The address family to use for routing-table and `get_close_nodes`
    /// purposes, after IPv4-in-IPv6 canonicalization.
    pub fn family(&self) -> Family {
        match self.addr {
            SocketAddr::V4(_) => Family::V4,
            SocketAddr::V6(_) => Family::V6,
        }
    }

    /// Size in bytes of this address's `PackedNode` wire encoding
    /// (ip + port only, not the public key).
    pub fn packed_addr_size(&self) -> usize {
        match self.family() {
            Family::V4 => 4 + 2,
            Family::V6 => 16 + 2,
        }
    }
}

fn canonicalize(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => {
            if let Some(v4) = v6.ip().to_ipv4() {
                SocketAddr::V4(SocketAddrV4::new(v4, v6.port()))
            } else {
                SocketAddr::V6(v6)
            }
        }
        v4 => v4,
    }
}

impl From<SocketAddr> for IpPort {
    fn from(addr: SocketAddr) -> Self {
        IpPort::new(addr)
    }
}

impl ToBytes for IpPort {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        match self.addr {
            SocketAddr::V4(v4) => {
                do_gen!(buf,
                    gen_slice!(v4.ip().octets()) >>
                    gen_be_u16!(v4.port())
                )
            }
            SocketAddr::V6(v6) => {
                do_gen!(buf,
                    gen_slice!(v6.ip().octets()) >>
                    gen_be_u16!(v6.port())
                )
            }
        }
    }
}

/// Parse an `IpPort` assuming an IPv4 (4 byte address + 2 byte port)
/// encoding. Used by `PackedNode::from_bytes` once the `IpType` tag has
/// already selected this branch.
pub fn from_bytes_v4(input: &[u8]) -> IResult<&[u8], IpPort> {
    do_parse!(input,
        octets: count_fixed!(u8, take_one_byte, 4) >>
        port: u16_be >>
        (IpPort::new(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]), port))))
    )
}

/// Parse an `IpPort` assuming an IPv6 (16 byte address + 2 byte port)
/// encoding.
pub fn from_bytes_v6(input: &[u8]) -> IResult<&[u8], IpPort> {
    do_parse!(input,
        octets: count_fixed!(u8, take_one_byte, 16) >>
        port: u16_be >>
        (IpPort::new(SocketAddr::V6(SocketAddrV6::new(
            Ipv6Addr::from(array16(&octets)), port, 0, 0))))
    )
}

fn array16(octets: &[u8; 16]) -> [u8; 16] {
    *octets
}

named!(take_one_byte<&[u8], u8>, map!(take!(1), |s: &[u8]| s[0]));
named!(u16_be<&[u8], u16>, map!(take!(2), |s: &[u8]| BigEndian::read_u16(s)));

/// Is `addr` a private/link-local/loopback address, i.e. plausibly on the
/// same LAN as us? Used to validate `LAN_DISCOVERY` senders (§4.5).
pub fn is_lan(addr: &IpAddr) -> bool {
    match *addr {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_mapped_v6_canonicalizes_to_v4() {
        let mapped: Ipv6Addr = "::ffff:192.168.1.1".parse().unwrap();
        let addr = SocketAddr::V6(SocketAddrV6::new(mapped, 33445, 0, 0));
        let ip_port = IpPort::new(addr);
        assert_eq!(ip_port.family(), Family::V4);
        match ip_port.socket_addr() {
            SocketAddr::V4(v4) => assert_eq!(*v4.ip(), Ipv4Addr::new(192, 168, 1, 1)),
            SocketAddr::V6(_) => panic!("expected canonicalized IPv4"),
        }
    }

    #[test]
    fn plain_v6_stays_v6() {
        let addr: SocketAddr = "[2001:db8::1]:33445".parse().unwrap();
        let ip_port = IpPort::new(addr);
        assert_eq!(ip_port.family(), Family::V6);
    }

    #[test]
    fn lan_detection() {
        assert!(is_lan(&"127.0.0.1".parse().unwrap()));
        assert!(is_lan(&"192.168.1.5".parse().unwrap()));
        assert!(is_lan(&"10.0.0.5".parse().unwrap()));
        assert!(!is_lan(&"8.8.8.8".parse().unwrap()));
    }
}
