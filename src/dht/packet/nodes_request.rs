/*! `GET_NODES`: requests the up-to-`MAX_SENT_NODES` nodes closest to
`target`, challenge-guarded by the same `ping_id` discipline as
`PingRequest`. Grounded directly on the teacher's
`toxcore/dht/packet/nodes_request.rs`.
*/

use binary_io::*;
use crypto_core::*;

/// Plaintext payload of a `GET_NODES` request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodesRequestPayload {
    /// Echoed back unchanged in the matching `NodesResponse`.
    pub id: u64,
    /// The id we want the closest known nodes to.
    pub target: PublicKey,
}

impl ToBytes for NodesRequestPayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u64!(self.id) >>
            gen_slice!(self.target.0)
        )
    }
}

impl FromBytes for NodesRequestPayload {
    named!(from_bytes<&[u8], NodesRequestPayload>, do_parse!(
        id: be_u64 >>
        target: call!(PublicKey::from_bytes) >>
        eof!() >>
        (NodesRequestPayload { id, target })
    ));
}

/// Sender public key, nonce, and the sealed `NodesRequestPayload`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodesRequest {
    /// Sender's public key.
    pub pk: PublicKey,
    nonce: Nonce,
    payload: Vec<u8>,
}

impl NodesRequest {
    /// Build and seal a fresh `GET_NODES` packet.
    pub fn new(shared_key: &PrecomputedKey, pk: PublicKey, payload: &NodesRequestPayload) -> Self {
        let nonce = gen_nonce();
        let plain = to_bytes_vec(payload);
        let payload = seal_precomputed(&plain, &nonce, shared_key);
        NodesRequest { pk, nonce, payload }
    }

    /// Decrypt and parse the payload.
    pub fn get_payload(&self, shared_key: &PrecomputedKey) -> Result<NodesRequestPayload, ()> {
        let plain = open_precomputed(&self.payload, &self.nonce, shared_key)?;
        match NodesRequestPayload::from_bytes(&plain) {
            IResult::Done(_, payload) => Ok(payload),
            _ => Err(()),
        }
    }
}

impl ToBytes for NodesRequest {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.pk.0) >>
            gen_slice!(self.nonce.0) >>
            gen_slice!(self.payload)
        )
    }
}

impl FromBytes for NodesRequest {
    named!(from_bytes<&[u8], NodesRequest>, do_parse!(
        pk: call!(PublicKey::from_bytes) >>
        nonce: call!(Nonce::from_bytes) >>
        payload: rest >>
        (NodesRequest { pk, nonce, payload: payload.to_vec() })
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_request_round_trip_decrypts() {
        let (pk_a, sk_a) = gen_keypair();
        let (pk_b, sk_b) = gen_keypair();
        let shared_send = precompute(&pk_b, &sk_a);
        let shared_recv = precompute(&pk_a, &sk_b);

        let payload = NodesRequestPayload { id: 99, target: gen_keypair().0 };
        let packet = NodesRequest::new(&shared_send, pk_a, &payload);

        let bytes = to_bytes_vec(&packet);
        let decoded = match NodesRequest::from_bytes(&bytes) {
            IResult::Done(rest, p) => {
                assert!(rest.is_empty());
                p
            }
            _ => panic!("failed to parse NodesRequest"),
        };

        assert_eq!(decoded.get_payload(&shared_recv).unwrap(), payload);
    }

    #[test]
    fn invalid_bytes_fail_to_parse() {
        assert!(NodesRequest::from_bytes(&[0u8; 4]).is_err());
    }
}
