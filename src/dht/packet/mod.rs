/*! The `DhtPacket` envelope: dispatches the first byte of every datagram
(§6) to the packet type that owns it. Grounded on the teacher's
`toxcore/dht/packet/mod.rs`, trimmed to the wire shapes this crate's DHT
actually speaks - no onion routing, no cookie/crypto-handshake, no TCP
relay tags, since those protocols are out of scope here.
*/

pub mod crypto_packet;
pub mod lan_discovery;
pub mod nodes_request;
pub mod nodes_response;
pub mod ping;

pub use self::crypto_packet::{CryptoPacket, NatPingKind, NatPingPayload};
pub use self::lan_discovery::LanDiscovery;
pub use self::nodes_request::{NodesRequest, NodesRequestPayload};
pub use self::nodes_response::{all_same_family, NodesResponse, NodesResponsePayload};
pub use self::ping::{PingPayload, PingRequest, PingResponse};

use binary_io::*;
use rendezvous::packet::RendezvousPacket;

const PING_REQUEST: u8 = 0;
const PING_RESPONSE: u8 = 1;
const GET_NODES: u8 = 2;
const SEND_NODES_IPV4: u8 = 3;
const SEND_NODES_IPV6: u8 = 4;
const LAN_DISCOVERY_V4: u8 = 32;
const LAN_DISCOVERY_V6: u8 = 33;
const RENDEZVOUS: u8 = 64;
const CRYPTO_PACKET: u8 = 254;

/// Every packet kind this DHT core parses off the wire, tagged by the
/// discriminator byte named in §6. Unrecognized first bytes (the Lossless
/// UDP / TCP relay transport range) are not represented here at all - the
/// socket layer drops them before reaching this enum.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DhtPacket {
    /// Byte 0.
    PingRequest(PingRequest),
    /// Byte 1.
    PingResponse(PingResponse),
    /// Byte 2.
    NodesRequest(NodesRequest),
    /// Byte 3 or 4, depending on address family; the `bool` is `true` when
    /// the (encrypted, thus otherwise opaque to this layer) payload holds
    /// only IPv4 nodes, set by the caller at construction time since it
    /// alone saw the nodes before sealing them.
    NodesResponse(NodesResponse, bool),
    /// Byte 32 or 33.
    LanDiscovery(LanDiscovery),
    /// Byte 64.
    Rendezvous(RendezvousPacket),
    /// Byte 254.
    Crypto(CryptoPacket),
}

impl DhtPacket {
    /// The discriminator byte this packet serializes with.
    pub fn kind_byte(&self) -> u8 {
        match *self {
            DhtPacket::PingRequest(_) => PING_REQUEST,
            DhtPacket::PingResponse(_) => PING_RESPONSE,
            DhtPacket::NodesRequest(_) => GET_NODES,
            DhtPacket::NodesResponse(_, all_ipv4) => if all_ipv4 { SEND_NODES_IPV4 } else { SEND_NODES_IPV6 },
            DhtPacket::LanDiscovery(_) => LAN_DISCOVERY_V4,
            DhtPacket::Rendezvous(_) => RENDEZVOUS,
            DhtPacket::Crypto(_) => CRYPTO_PACKET,
        }
    }
}

impl ToBytes for DhtPacket {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        match *self {
            DhtPacket::PingRequest(ref p) => {
                do_gen!(buf, gen_be_u8!(PING_REQUEST) >> gen_call!(|b, v: &PingRequest| v.to_bytes(b), p))
            }
            DhtPacket::PingResponse(ref p) => {
                do_gen!(buf, gen_be_u8!(PING_RESPONSE) >> gen_call!(|b, v: &PingResponse| v.to_bytes(b), p))
            }
            DhtPacket::NodesRequest(ref p) => {
                do_gen!(buf, gen_be_u8!(GET_NODES) >> gen_call!(|b, v: &NodesRequest| v.to_bytes(b), p))
            }
            DhtPacket::NodesResponse(ref p, all_ipv4) => {
                let tag = if all_ipv4 { SEND_NODES_IPV4 } else { SEND_NODES_IPV6 };
                do_gen!(buf, gen_be_u8!(tag) >> gen_call!(|b, v: &NodesResponse| v.to_bytes(b), p))
            }
            DhtPacket::LanDiscovery(ref p) => {
                do_gen!(buf, gen_be_u8!(LAN_DISCOVERY_V4) >> gen_call!(|b, v: &LanDiscovery| v.to_bytes(b), p))
            }
            DhtPacket::Rendezvous(ref p) => {
                do_gen!(buf, gen_be_u8!(RENDEZVOUS) >> gen_call!(|b, v: &RendezvousPacket| v.to_bytes(b), p))
            }
            DhtPacket::Crypto(ref p) => {
                do_gen!(buf, gen_be_u8!(CRYPTO_PACKET) >> gen_call!(|b, v: &CryptoPacket| v.to_bytes(b), p))
            }
        }
    }
}

impl FromBytes for DhtPacket {
    named!(from_bytes<&[u8], DhtPacket>, switch!(take!(1),
        b if b[0] == PING_REQUEST => map!(call!(PingRequest::from_bytes), DhtPacket::PingRequest) |
        b if b[0] == PING_RESPONSE => map!(call!(PingResponse::from_bytes), DhtPacket::PingResponse) |
        b if b[0] == GET_NODES => map!(call!(NodesRequest::from_bytes), DhtPacket::NodesRequest) |
        b if b[0] == SEND_NODES_IPV4 =>
            map!(call!(NodesResponse::from_bytes), |p| DhtPacket::NodesResponse(p, true)) |
        b if b[0] == SEND_NODES_IPV6 =>
            map!(call!(NodesResponse::from_bytes), |p| DhtPacket::NodesResponse(p, false)) |
        b if b[0] == LAN_DISCOVERY_V4 || b[0] == LAN_DISCOVERY_V6 =>
            map!(call!(LanDiscovery::from_bytes), DhtPacket::LanDiscovery) |
        b if b[0] == RENDEZVOUS => map!(call!(RendezvousPacket::from_bytes), DhtPacket::Rendezvous) |
        b if b[0] == CRYPTO_PACKET => map!(call!(CryptoPacket::from_bytes), DhtPacket::Crypto)
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    #[test]
    fn dispatches_lan_discovery_by_first_byte() {
        let packet = DhtPacket::LanDiscovery(LanDiscovery::new(gen_keypair().0));
        let bytes = to_bytes_vec(&packet);
        assert_eq!(bytes[0], LAN_DISCOVERY_V4);
        let decoded = DhtPacket::from_bytes(&bytes).to_result().unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn unknown_discriminator_fails_to_parse() {
        assert!(DhtPacket::from_bytes(&[200u8, 1, 2, 3]).is_err());
    }
}
