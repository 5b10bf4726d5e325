/*! `SEND_NODES_IPV4`/`SEND_NODES_IPV6`: the `GET_NODES` reply, carrying up
to `MAX_SENT_NODES` `PackedNode`s of one address family plus the echoed
ping id. The two wire discriminators (§6) differ only in which family of
node the payload holds; `PackedNode`'s own address tag already identifies
that family, so one payload/packet shape serves both and the dispatch
layer (`dht/packet/mod.rs`) picks byte 3 vs 4 by inspecting the nodes.
*/

use binary_io::*;
use config::MAX_SENT_NODES;
use crypto_core::*;
use dht::packed_node::{many_packed_nodes, PackedNode};

/// Plaintext payload of a `SEND_NODES_*` response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodesResponsePayload {
    /// Echoes the requester's `ping_id`.
    pub id: u64,
    /// Up to `MAX_SENT_NODES` nodes, all of the same address family.
    pub nodes: Vec<PackedNode>,
}

impl ToBytes for NodesResponsePayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        let mut buf = do_gen!(buf, gen_be_u8!(self.nodes.len() as u8) >> gen_be_u64!(self.id))?;
        for node in &self.nodes {
            buf = node.to_bytes(buf)?;
        }
        Ok(buf)
    }
}

impl FromBytes for NodesResponsePayload {
    named!(from_bytes<&[u8], NodesResponsePayload>, do_parse!(
        count: map!(take!(1), |s: &[u8]| s[0] as usize) >>
        id: be_u64 >>
        nodes: map_opt!(rest, |bytes| nodes_of_count(bytes, count)) >>
        (NodesResponsePayload { id, nodes })
    ));
}

fn nodes_of_count(bytes: &[u8], count: usize) -> Option<Vec<PackedNode>> {
    if count > MAX_SENT_NODES {
        return None;
    }
    let nodes = many_packed_nodes(bytes).unwrap_or_default();
    if nodes.len() == count { Some(nodes) } else { None }
}

/// Sender public key, nonce, and the sealed `NodesResponsePayload`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodesResponse {
    /// Sender's public key.
    pub pk: PublicKey,
    nonce: Nonce,
    payload: Vec<u8>,
}

impl NodesResponse {
    /// Build and seal a fresh `SEND_NODES_*` packet. Panics if `payload`
    /// carries more than `MAX_SENT_NODES` entries or mixes address
    /// families - callers (`Server::handle_nodes_request`) are expected to
    /// have already split results by family.
    pub fn new(shared_key: &PrecomputedKey, pk: PublicKey, payload: &NodesResponsePayload) -> Self {
        assert!(payload.nodes.len() <= MAX_SENT_NODES);
        let nonce = gen_nonce();
        let plain = to_bytes_vec(payload);
        let payload = seal_precomputed(&plain, &nonce, shared_key);
        NodesResponse { pk, nonce, payload }
    }

    /// Decrypt and parse the payload.
    pub fn get_payload(&self, shared_key: &PrecomputedKey) -> Result<NodesResponsePayload, ()> {
        let plain = open_precomputed(&self.payload, &self.nonce, shared_key)?;
        match NodesResponsePayload::from_bytes(&plain) {
            IResult::Done(_, payload) => Ok(payload),
            _ => Err(()),
        }
    }
}

impl ToBytes for NodesResponse {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.pk.0) >>
            gen_slice!(self.nonce.0) >>
            gen_slice!(self.payload)
        )
    }
}

impl FromBytes for NodesResponse {
    named!(from_bytes<&[u8], NodesResponse>, do_parse!(
        pk: call!(PublicKey::from_bytes) >>
        nonce: call!(Nonce::from_bytes) >>
        payload: rest >>
        (NodesResponse { pk, nonce, payload: payload.to_vec() })
    ));
}

/// `true` if every node in `nodes` is the given family - used by the
/// dispatch layer to pick byte 3 (all IPv4) vs byte 4 (all IPv6).
pub fn all_same_family(nodes: &[PackedNode]) -> bool {
    match nodes.split_first() {
        None => true,
        Some((first, rest)) => {
            let family = first.ip_port().family();
            rest.iter().all(|n| n.ip_port().family() == family)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    #[test]
    fn nodes_response_round_trip_with_several_nodes() {
        let (pk_a, sk_a) = gen_keypair();
        let (pk_b, sk_b) = gen_keypair();
        let shared_send = precompute(&pk_b, &sk_a);
        let shared_recv = precompute(&pk_a, &sk_b);

        let nodes = vec![
            PackedNode::new(gen_keypair().0, "127.0.0.1:1".parse().unwrap()),
            PackedNode::new(gen_keypair().0, "127.0.0.1:2".parse().unwrap()),
        ];
        let payload = NodesResponsePayload { id: 55, nodes };
        let packet = NodesResponse::new(&shared_send, pk_a, &payload);

        let bytes = to_bytes_vec(&packet);
        let decoded = match NodesResponse::from_bytes(&bytes) {
            IResult::Done(rest, p) => {
                assert!(rest.is_empty());
                p
            }
            _ => panic!("failed to parse NodesResponse"),
        };

        assert_eq!(decoded.get_payload(&shared_recv).unwrap(), payload);
    }

    #[test]
    fn empty_nodes_round_trips() {
        let (pk_a, sk_a) = gen_keypair();
        let (pk_b, sk_b) = gen_keypair();
        let shared_send = precompute(&pk_b, &sk_a);
        let shared_recv = precompute(&pk_a, &sk_b);

        let payload = NodesResponsePayload { id: 1, nodes: Vec::new() };
        let packet = NodesResponse::new(&shared_send, pk_a, &payload);
        let bytes = to_bytes_vec(&packet);
        let decoded = NodesResponse::from_bytes(&bytes).to_result().unwrap();
        assert_eq!(decoded.get_payload(&shared_recv).unwrap(), payload);
    }
}
