/*! `PackedNode`: the smallest unit that names a DHT node - a public key
plus the address it was last seen at. Appended end-to-end, this is also
how `NodesResponse`/`SendNodes` carries up to `MAX_SENT_NODES` results.
*/

use std::net::SocketAddr;

use binary_io::*;
use crypto_core::*;
use ip_port::*;

/// Tag byte preceding an address in a `PackedNode`, matching the teacher's
/// `IpType` but restricted to the UDP variants this crate's DHT actually
/// uses (no TCP-relay tags; that protocol is out of scope).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum AddrTag {
    V4 = 2,
    V6 = 10,
}

impl AddrTag {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            2 => Some(AddrTag::V4),
            10 => Some(AddrTag::V6),
            _ => None,
        }
    }
}

/// A node's public key and the address it was last seen at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PackedNode {
    /// Public key / node id.
    pub pk: PublicKey,
    /// Address the node announced or was observed from.
    pub saddr: SocketAddr,
}

impl PackedNode {
    /// Build a `PackedNode` from a public key and address.
    pub fn new(pk: PublicKey, saddr: SocketAddr) -> Self {
        PackedNode { pk, saddr }
    }

    /// The canonicalized, family-tagged address.
    pub fn ip_port(&self) -> IpPort {
        IpPort::new(self.saddr)
    }

    /// Serialized size in bytes of this node given its address family.
    pub fn size(&self) -> usize {
        1 + self.ip_port().packed_addr_size() + PUBLICKEYBYTES
    }
}

impl ToBytes for PackedNode {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        let ip_port = self.ip_port();
        match ip_port.family() {
            ip_port::Family::V4 => {
                do_gen!(buf,
                    gen_be_u8!(AddrTag::V4 as u8) >>
                    gen_call!(|b, v: &IpPort| v.to_bytes(b), &ip_port) >>
                    gen_slice!(self.pk.0)
                )
            }
            ip_port::Family::V6 => {
                do_gen!(buf,
                    gen_be_u8!(AddrTag::V6 as u8) >>
                    gen_call!(|b, v: &IpPort| v.to_bytes(b), &ip_port) >>
                    gen_slice!(self.pk.0)
                )
            }
        }
    }
}

impl FromBytes for PackedNode {
    named!(from_bytes<&[u8], PackedNode>, do_parse!(
        tag: map_opt!(take!(1), |s: &[u8]| AddrTag::from_byte(s[0])) >>
        saddr: switch!(value!(tag),
            AddrTag::V4 => call!(from_bytes_v4) |
            AddrTag::V6 => call!(from_bytes_v6)
        ) >>
        pk: call!(PublicKey::from_bytes) >>
        (PackedNode { pk, saddr: saddr.socket_addr() })
    ));
}

/// Parse as many consecutive `PackedNode`s as fit in `bytes`, stopping at
/// the first parse failure. Returns `None` if zero were parsed, matching
/// the teacher's `from_bytes_multiple` contract.
pub fn many_packed_nodes(bytes: &[u8]) -> Option<Vec<PackedNode>> {
    let mut pos = 0;
    let mut result = Vec::new();
    while pos < bytes.len() {
        match PackedNode::from_bytes(&bytes[pos..]) {
            IResult::Done(rest, node) => {
                pos = bytes.len() - rest.len();
                result.push(node);
            }
            _ => break,
        }
    }
    if result.is_empty() { None } else { Some(result) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    encode_decode_test!(
        packed_node_v4_encode_decode,
        PackedNode::new(gen_keypair().0, "127.0.0.1:33445".parse().unwrap())
    );

    encode_decode_test!(
        packed_node_v6_encode_decode,
        PackedNode::new(gen_keypair().0, "[2001:db8::1]:33445".parse().unwrap())
    );

    #[test]
    fn many_packed_nodes_parses_until_failure() {
        let a = PackedNode::new(gen_keypair().0, "127.0.0.1:1".parse().unwrap());
        let b = PackedNode::new(gen_keypair().0, "127.0.0.1:2".parse().unwrap());
        let mut bytes = to_bytes_vec(&a);
        bytes.extend_from_slice(&to_bytes_vec(&b));

        let nodes = many_packed_nodes(&bytes).unwrap();
        assert_eq!(nodes, vec![a, b]);
    }

    #[test]
    fn many_packed_nodes_empty_is_none() {
        assert!(many_packed_nodes(&[]).is_none());
    }
}
