/*! `CRYPTO_PACKET` (byte 254): an encrypted payload routed *through* one
of a friend's known close nodes rather than sent directly, carrying either
a `NAT_PING_REQUEST`/`_RESPONSE` (§4.6) or an application-level request.
This crate only interprets the NAT-ping sub-type; any other first payload
byte is handed back to the caller unparsed as an opaque application
request, matching §6's "plus an application range" note. Grounded on the
teacher's routed-ping idiom in `dht.rs`/`dht_friend.rs` (`route_tofriend`/
`routeone_tofriend`), generalized into one envelope type.
*/

use binary_io::*;
use crypto_core::*;

/// Which half of the NAT-ping round trip a `NatPingPayload` carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NatPingKind {
    /// `NAT_PING_REQUEST`.
    Request,
    /// `NAT_PING_RESPONSE`.
    Response,
}

impl NatPingKind {
    fn to_byte(self) -> u8 {
        match self {
            NatPingKind::Request => 0,
            NatPingKind::Response => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(NatPingKind::Request),
            1 => Some(NatPingKind::Response),
            _ => None,
        }
    }
}

/// Plaintext payload of a routed NAT-ping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NatPingPayload {
    /// Request or response.
    pub kind: NatPingKind,
    /// Challenge value (see `HolePunching::send_ping`/`handle_ping_response`).
    pub id: u64,
}

impl ToBytes for NatPingPayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(self.kind.to_byte()) >>
            gen_be_u64!(self.id)
        )
    }
}

impl FromBytes for NatPingPayload {
    named!(from_bytes<&[u8], NatPingPayload>, do_parse!(
        kind: map_opt!(take!(1), |s: &[u8]| NatPingKind::from_byte(s[0])) >>
        id: be_u64 >>
        eof!() >>
        (NatPingPayload { kind, id })
    ));
}

/// The routed envelope: sender public key, nonce, and the sealed payload
/// (either a `NatPingPayload` or an opaque application blob).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CryptoPacket {
    /// Sender's public key.
    pub pk: PublicKey,
    nonce: Nonce,
    payload: Vec<u8>,
}

impl CryptoPacket {
    /// Seal `plain` bytes for routed delivery.
    pub fn new(shared_key: &PrecomputedKey, pk: PublicKey, plain: &[u8]) -> Self {
        let nonce = gen_nonce();
        let payload = seal_precomputed(plain, &nonce, shared_key);
        CryptoPacket { pk, nonce, payload }
    }

    /// Seal a `NatPingPayload` specifically.
    pub fn new_nat_ping(shared_key: &PrecomputedKey, pk: PublicKey, payload: &NatPingPayload) -> Self {
        CryptoPacket::new(shared_key, pk, &to_bytes_vec(payload))
    }

    /// Decrypt the raw payload bytes, leaving interpretation to the caller.
    pub fn decrypt(&self, shared_key: &PrecomputedKey) -> Result<Vec<u8>, ()> {
        open_precomputed(&self.payload, &self.nonce, shared_key)
    }

    /// Decrypt and parse as a `NatPingPayload`; `Err(())` covers both a
    /// decrypt failure and a non-NAT-ping payload.
    pub fn decrypt_nat_ping(&self, shared_key: &PrecomputedKey) -> Result<NatPingPayload, ()> {
        let plain = self.decrypt(shared_key)?;
        match NatPingPayload::from_bytes(&plain) {
            IResult::Done(_, payload) => Ok(payload),
            _ => Err(()),
        }
    }
}

impl ToBytes for CryptoPacket {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.pk.0) >>
            gen_slice!(self.nonce.0) >>
            gen_slice!(self.payload)
        )
    }
}

impl FromBytes for CryptoPacket {
    named!(from_bytes<&[u8], CryptoPacket>, do_parse!(
        pk: call!(PublicKey::from_bytes) >>
        nonce: call!(Nonce::from_bytes) >>
        payload: rest >>
        (CryptoPacket { pk, nonce, payload: payload.to_vec() })
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nat_ping_round_trip_decrypts() {
        let (pk_a, sk_a) = gen_keypair();
        let (pk_b, sk_b) = gen_keypair();
        let shared_send = precompute(&pk_b, &sk_a);
        let shared_recv = precompute(&pk_a, &sk_b);

        let payload = NatPingPayload { kind: NatPingKind::Request, id: 0x1122_3344 };
        let packet = CryptoPacket::new_nat_ping(&shared_send, pk_a, &payload);

        let bytes = to_bytes_vec(&packet);
        let decoded = CryptoPacket::from_bytes(&bytes).to_result().unwrap();
        assert_eq!(decoded.decrypt_nat_ping(&shared_recv).unwrap(), payload);
    }
}
