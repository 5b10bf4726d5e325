/*! The address & socket layer (§4.1): a `tokio_codec::Decoder`/`Encoder`
pair over a `UdpSocket`, following the teacher's framed-codec idiom in
`tcp/codec.rs`/`examples/tcp_server.rs` but for connectionless UDP and this
crate's `DhtPacket` enum instead of the teacher's length-prefixed
encrypted TCP frames.

`DhtCodec` dispatches on the first byte of each datagram (the packet-type
discriminator named in §6) via `DhtPacket::from_bytes`; a malformed or
too-short datagram decodes to `Ok(None)` rather than an `Err`, so one bad
packet on a public port never tears down the `UdpFramed` stream the way a
hard parse error would.
*/

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_codec::{Decoder, Encoder};

use binary_io::{to_bytes_vec, FromBytes, IResult};
use dht::packet::DhtPacket;

/// Largest UDP datagram `DhtCodec` will ever read or write, matching
/// `binary_io::MAX_DHT_PACKET_SIZE`.
const MAX_DATAGRAM_SIZE: usize = ::binary_io::MAX_DHT_PACKET_SIZE;

/// Codec binding `DhtPacket` to raw UDP datagrams for use with
/// `tokio::net::UdpFramed`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DhtCodec;

impl Decoder for DhtCodec {
    type Item = DhtPacket;
    type Error = io::Error;

    /// `UdpFramed` hands us exactly one datagram per call, already in
    /// `buf`. We either parse the whole thing as a `DhtPacket` or drop it
    /// silently - never propagate a parse failure as a stream error,
    /// since an untrusted peer can put arbitrary bytes on this socket.
    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<DhtPacket>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let len = buf.len();
        let datagram = buf.split_to(len);
        match DhtPacket::from_bytes(&datagram) {
            IResult::Done(rest, packet) => {
                if rest.is_empty() {
                    Ok(Some(packet))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }
}

impl Encoder for DhtCodec {
    type Item = DhtPacket;
    type Error = io::Error;

    fn encode(&mut self, packet: DhtPacket, buf: &mut BytesMut) -> io::Result<()> {
        let bytes = to_bytes_vec(&packet);
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "packet exceeds MAX_DHT_PACKET_SIZE"));
        }
        buf.reserve(bytes.len());
        buf.put_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;
    use dht::packet::LanDiscovery;

    #[test]
    fn round_trips_through_encode_decode() {
        let mut codec = DhtCodec;
        let packet = DhtPacket::LanDiscovery(LanDiscovery::new(gen_keypair().0));

        let mut buf = BytesMut::new();
        codec.encode(packet.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().expect("should decode");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn garbage_decodes_to_none_not_an_error() {
        let mut codec = DhtCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[200u8, 1, 2, 3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn empty_buffer_decodes_to_none() {
        let mut codec = DhtCodec;
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
