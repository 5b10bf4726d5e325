/*! The `RENDEZVOUS` wire packet (§4.7/§6): unencrypted, since there is
nothing to protect beyond the unguessability of the passphrase that
produced `unspecific`. Grounded directly on
`original_source/toxcore/rendezvous.c`'s `RendezVousPacket`.
*/

use binary_io::*;
use crypto_core::PublicKey;

/// `{unspecific, specific, target_id}` as sent on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RendezvousPacket {
    /// The rendezvous point: `SHA512(timestamp || "@" || passphrase)[0..32]`.
    pub unspecific: [u8; 32],
    /// `specific_calc XOR extra`, letting a match recover `extra`.
    pub specific: [u8; 32],
    /// The publisher's own public key.
    pub target_id: PublicKey,
}

impl RendezvousPacket {
    /// Build a packet from its three fields.
    pub fn new(unspecific: [u8; 32], specific: [u8; 32], target_id: PublicKey) -> Self {
        RendezvousPacket { unspecific, specific, target_id }
    }
}

impl ToBytes for RendezvousPacket {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.unspecific) >>
            gen_slice!(self.specific) >>
            gen_slice!(self.target_id.0)
        )
    }
}

impl FromBytes for RendezvousPacket {
    named!(from_bytes<&[u8], RendezvousPacket>, do_parse!(
        unspecific: map!(take!(32), array32) >>
        specific: map!(take!(32), array32) >>
        target_id: call!(PublicKey::from_bytes) >>
        eof!() >>
        (RendezvousPacket { unspecific, specific, target_id })
    ));
}

fn array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    encode_decode_test!(
        rendezvous_packet_encode_decode,
        RendezvousPacket::new([1u8; 32], [2u8; 32], gen_keypair().0)
    );
}
