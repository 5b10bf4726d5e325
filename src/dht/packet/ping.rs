/*! `PingRequest`/`PingResponse`: the simplest authenticated packet pair,
carrying nothing but a random challenge id. Grounded on the teacher's
`nodes_request.rs` shape (`{pk, nonce, payload}` wrapper around an
encrypted fixed-size payload), reduced to the single `u64` ping id named
in §4.3/§6.
*/

use binary_io::*;
use crypto_core::*;

/// Plaintext carried inside a ping request or response, before encryption.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PingPayload {
    /// Challenge value, echoed unchanged in the matching response.
    pub id: u64,
}

impl ToBytes for PingPayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf, gen_be_u64!(self.id))
    }
}

impl FromBytes for PingPayload {
    named!(from_bytes<&[u8], PingPayload>, do_parse!(
        id: be_u64 >>
        eof!() >>
        (PingPayload { id })
    ));
}

macro_rules! ping_packet {
    ($name:ident) => {
        /// Sender public key, nonce, and the `PingPayload` sealed under the
        /// sender/recipient shared key.
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub struct $name {
            /// Sender's public key.
            pub pk: PublicKey,
            nonce: Nonce,
            payload: Vec<u8>,
        }

        impl $name {
            /// Build and seal a fresh packet carrying `payload`.
            pub fn new(shared_key: &PrecomputedKey, pk: PublicKey, payload: &PingPayload) -> Self {
                let nonce = gen_nonce();
                let plain = to_bytes_vec(payload);
                let payload = seal_precomputed(&plain, &nonce, shared_key);
                $name { pk, nonce, payload }
            }

            /// Decrypt and parse the payload using the shared key with the
            /// packet's sender.
            pub fn get_payload(&self, shared_key: &PrecomputedKey) -> Result<PingPayload, ()> {
                let plain = open_precomputed(&self.payload, &self.nonce, shared_key)?;
                match PingPayload::from_bytes(&plain) {
                    IResult::Done(_, payload) => Ok(payload),
                    _ => Err(()),
                }
            }
        }

        impl ToBytes for $name {
            fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
                do_gen!(buf,
                    gen_slice!(self.pk.0) >>
                    gen_slice!(self.nonce.0) >>
                    gen_slice!(self.payload)
                )
            }
        }

        impl FromBytes for $name {
            named!(from_bytes<&[u8], $name>, do_parse!(
                pk: call!(PublicKey::from_bytes) >>
                nonce: call!(Nonce::from_bytes) >>
                payload: rest >>
                ($name { pk, nonce, payload: payload.to_vec() })
            ));
        }
    }
}

ping_packet!(PingRequest);
ping_packet!(PingResponse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_round_trip_decrypts() {
        let (pk_a, sk_a) = gen_keypair();
        let (pk_b, sk_b) = gen_keypair();
        let shared_send = precompute(&pk_b, &sk_a);
        let shared_recv = precompute(&pk_a, &sk_b);

        let payload = PingPayload { id: 0xdead_beef_1234_5678 };
        let packet = PingRequest::new(&shared_send, pk_a, &payload);

        let bytes = to_bytes_vec(&packet);
        let decoded = match PingRequest::from_bytes(&bytes) {
            IResult::Done(rest, p) => {
                assert!(rest.is_empty());
                p
            }
            _ => panic!("failed to parse PingRequest"),
        };

        let out = decoded.get_payload(&shared_recv).expect("decrypt failed");
        assert_eq!(out, payload);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let (pk_a, sk_a) = gen_keypair();
        let (pk_b, _sk_b) = gen_keypair();
        let (_pk_c, sk_c) = gen_keypair();
        let shared_send = precompute(&pk_b, &sk_a);
        let shared_wrong = precompute(&pk_a, &sk_c);

        let packet = PingResponse::new(&shared_send, pk_a, &PingPayload { id: 7 });
        assert!(packet.get_payload(&shared_wrong).is_err());
    }
}
