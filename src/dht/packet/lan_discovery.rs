/*! `LAN_DISCOVERY`: an unencrypted broadcast announcing our public key to
the local subnet, so nodes on the same LAN find each other without a
bootstrap node. Grounded on `DHT.c`'s LAN discovery handling and the
teacher's plain `{sender_pub}` packets (`dht.rs`'s `Ping`-like minimal
shape, here with no encryption since there's nothing secret in an
announcement every LAN peer is meant to see).
*/

use binary_io::*;
use crypto_core::PublicKey;

/// Broadcast packet carrying only the sender's public key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LanDiscovery {
    /// The broadcasting node's public key.
    pub pk: PublicKey,
}

impl LanDiscovery {
    /// Wrap `pk` for broadcast.
    pub fn new(pk: PublicKey) -> Self {
        LanDiscovery { pk }
    }
}

impl ToBytes for LanDiscovery {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf, gen_slice!(self.pk.0))
    }
}

impl FromBytes for LanDiscovery {
    named!(from_bytes<&[u8], LanDiscovery>, do_parse!(
        pk: call!(PublicKey::from_bytes) >>
        eof!() >>
        (LanDiscovery { pk })
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    encode_decode_test!(
        lan_discovery_encode_decode,
        LanDiscovery::new(gen_keypair().0)
    );
}
