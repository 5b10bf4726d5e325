/*! Snapshot/restore of exactly the two record kinds the DHT core itself
owns - the friend list and the close list - through the byte layout named
in §6/§4.9: a 32-bit LE magic, then a sequence of `{len, kind_tag, bytes}`
records. This is *not* the richer multi-section profile serializer (name,
status message, TCP relay list, onion path nodes) that the messaging
application layer owns above this crate; that one is out of scope, per
the teacher's own `toxcore::state_format::old` being reference material
only (it describes exactly that richer, out-of-scope format).

Only the fields needed to re-seed a `Server` on restart are persisted:
a friend's identity (its client list and NAT state are rebuilt from live
traffic) and a close-list entry's identity and last-known address (its
liveness timestamps reset to "just learned" on load, which is consistent
with this crate making no session-persistence guarantees across
restarts, per the system overview's Non-goals).
*/

use byteorder::{ByteOrder, LittleEndian};

use binary_io::*;
use crypto_core::PublicKey;
use dht::friend::FriendList;
use dht::kbucket::Bucket;
use dht::packed_node::{many_packed_nodes, PackedNode};
use error::CoreError;

/// 32-bit LE magic opening a persisted state file.
pub const MAGIC: u32 = 0x0159_000D;

const RECORD_TAG_PREFIX: u32 = 0x11CE << 16;

/// Record kind tag: the friend list (array of friend public keys).
pub const KIND_FRIEND_LIST: u32 = RECORD_TAG_PREFIX | 1;
/// Record kind tag: the close list (array of `PackedNode`).
pub const KIND_CLIENT_LIST: u32 = RECORD_TAG_PREFIX | 2;

/// Serialize the friend list and close list into the persisted layout.
/// `capacity` sizes the close list `Bucket` reconstructed by `load`.
pub fn save(friends: &FriendList, close_list: &Bucket) -> Vec<u8> {
    let mut out = vec![0u8; 4];
    LittleEndian::write_u32(&mut out[0..4], MAGIC);

    let friend_pks: Vec<PublicKey> = friends.iter().map(|f| f.pk).collect();
    write_record(&mut out, KIND_FRIEND_LIST, &encode_pks(&friend_pks));

    let nodes: Vec<PackedNode> = close_list.iter().map(|c| c.to_packed_node()).collect();
    write_record(&mut out, KIND_CLIENT_LIST, &encode_nodes(&nodes));

    out
}

fn write_record(out: &mut Vec<u8>, kind: u32, body: &[u8]) {
    let mut header = [0u8; 8];
    LittleEndian::write_u32(&mut header[0..4], body.len() as u32);
    LittleEndian::write_u32(&mut header[4..8], kind);
    out.extend_from_slice(&header);
    out.extend_from_slice(body);
}

fn encode_pks(pks: &[PublicKey]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pks.len() * 32);
    for pk in pks {
        out.extend_from_slice(&pk.0);
    }
    out
}

fn decode_pks(bytes: &[u8]) -> Option<Vec<PublicKey>> {
    if bytes.len() % 32 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 32);
    for chunk in bytes.chunks(32) {
        out.push(PublicKey::from_slice(chunk)?);
    }
    Some(out)
}

fn encode_nodes(nodes: &[PackedNode]) -> Vec<u8> {
    let mut buf = vec![0u8; nodes.iter().map(PackedNode::size).sum()];
    let mut pos = 0;
    for node in nodes {
        let (_, new_pos) = node.to_bytes((&mut buf, pos)).expect("buffer sized exactly");
        pos = new_pos;
    }
    buf
}

/// The result of loading a persisted state file: the friend public keys
/// to re-add, and the close-list nodes to re-seed, in file order.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct LoadedState {
    /// Friends to re-add via `FriendList::add`.
    pub friends: Vec<PublicKey>,
    /// Close-list nodes to re-seed via `Bucket::add_or_update`.
    pub close_nodes: Vec<PackedNode>,
}

/// Parse a persisted state file, skipping unknown record kinds forward by
/// their declared length so a file written by a newer core (with more
/// record kinds) still restores the kinds this core understands.
pub fn load(bytes: &[u8]) -> Result<LoadedState, CoreError> {
    if bytes.len() < 4 {
        return Err(CoreError::Deserialize { what: "state file magic" });
    }
    let magic = LittleEndian::read_u32(&bytes[0..4]);
    if magic != MAGIC {
        return Err(CoreError::Deserialize { what: "state file magic" });
    }

    let mut state = LoadedState::default();
    let mut pos = 4;
    while pos < bytes.len() {
        if bytes.len() - pos < 8 {
            return Err(CoreError::Deserialize { what: "state record header" });
        }
        let len = LittleEndian::read_u32(&bytes[pos..pos + 4]) as usize;
        let kind = LittleEndian::read_u32(&bytes[pos + 4..pos + 8]);
        pos += 8;
        if bytes.len() - pos < len {
            return Err(CoreError::Deserialize { what: "state record body" });
        }
        let body = &bytes[pos..pos + len];
        pos += len;

        match kind {
            KIND_FRIEND_LIST => {
                state.friends = decode_pks(body)
                    .ok_or(CoreError::Deserialize { what: "friend list record" })?;
            }
            KIND_CLIENT_LIST => {
                state.close_nodes = many_packed_nodes(body).unwrap_or_default();
            }
            _ => { /* unknown record kind: already skipped past by `pos += len` above */ }
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;
    use std::time::Duration;

    #[test]
    fn round_trips_friends_and_close_list() {
        let mut friends = FriendList::new();
        let friend_pk = gen_keypair().0;
        friends.add(friend_pk);

        let mut close_list = Bucket::with_capacity(32);
        let node_pk = gen_keypair().0;
        let addr = "127.0.0.1:33445".parse().unwrap();
        close_list.add_or_update(&gen_keypair().0, node_pk, addr, Duration::from_secs(70));

        let bytes = save(&friends, &close_list);
        assert_eq!(LittleEndian::read_u32(&bytes[0..4]), MAGIC);

        let loaded = load(&bytes).expect("should parse");
        assert_eq!(loaded.friends, vec![friend_pk]);
        assert_eq!(loaded.close_nodes.len(), 1);
        assert_eq!(loaded.close_nodes[0].pk, node_pk);
        assert_eq!(loaded.close_nodes[0].saddr, addr);
    }

    #[test]
    fn unknown_record_kind_is_skipped_forward() {
        let mut bytes = vec![0u8; 4];
        LittleEndian::write_u32(&mut bytes[0..4], MAGIC);
        // an unknown record kind with a 3-byte body, followed by a real one
        let mut header = [0u8; 8];
        LittleEndian::write_u32(&mut header[0..4], 3);
        LittleEndian::write_u32(&mut header[4..8], RECORD_TAG_PREFIX | 99);
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&[1, 2, 3]);

        let friends = FriendList::new();
        let close_list = Bucket::with_capacity(32);
        bytes.extend_from_slice(&save(&friends, &close_list)[4..]);

        let loaded = load(&bytes).expect("should parse past the unknown record");
        assert!(loaded.friends.is_empty());
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert!(load(&[0, 0, 0, 0]).is_err());
    }
}
