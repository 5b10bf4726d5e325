/*! The to-ping queue: a small staging area of addresses worth pinging
once, drained every `time_toping` seconds. Grounded on `DHT.c`'s
`add_toping`/`do_toping`.
*/

use std::net::SocketAddr;
use std::time::Instant;

use crypto_core::PublicKey;
use dht::kbucket::Bucket;

/// A candidate address waiting to be pinged exactly once.
#[derive(Clone, Copy)]
struct ToPingEntry {
    pk: PublicKey,
    saddr: SocketAddr,
}

/// Bounded queue of addresses discovered (e.g. via `ReturnIp` reports or
/// unsolicited packets) that deserve a ping before being considered for
/// the close list proper.
pub struct ToPingQueue {
    capacity: usize,
    entries: Vec<Option<ToPingEntry>>,
    last_run: Instant,
}

impl ToPingQueue {
    /// An empty queue with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        ToPingQueue {
            capacity,
            entries: vec![None; capacity],
            last_run: Instant::now(),
        }
    }

    /// Queue `pk`/`saddr` for a ping. Fills the first empty slot; if the
    /// queue is full, displaces whichever entry is furthest (by XOR
    /// distance) from `self_pk`, matching `add_toping`'s "push out the
    /// worst" fallback. Returns `false` only if every entry, including the
    /// candidate, ties for furthest (practically unreachable with real
    /// keys).
    pub fn try_add(&mut self, self_pk: &PublicKey, pk: PublicKey, saddr: SocketAddr) -> bool {
        if self.entries.iter().any(|e| e.map(|e| e.pk) == Some(pk)) {
            return true;
        }

        if let Some(slot) = self.entries.iter_mut().find(|e| e.is_none()) {
            *slot = Some(ToPingEntry { pk, saddr });
            return true;
        }

        let worst = self.entries.iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let da = xor_distance(self_pk, &a.unwrap().pk);
                let db = xor_distance(self_pk, &b.unwrap().pk);
                da.cmp(&db)
            })
            .map(|(i, _)| i);

        if let Some(idx) = worst {
            let candidate_distance = xor_distance(self_pk, &pk);
            let worst_distance = xor_distance(self_pk, &self.entries[idx].unwrap().pk);
            if candidate_distance < worst_distance {
                self.entries[idx] = Some(ToPingEntry { pk, saddr });
                return true;
            }
        }
        false
    }

    /// `true` once `time_toping` has elapsed since the last drain.
    pub fn is_due(&self, time_toping: ::std::time::Duration) -> bool {
        self.last_run.elapsed() >= time_toping
    }

    /// Drain the queue: every occupied slot is returned for the caller to
    /// ping, then cleared, matching `do_toping`'s ping-then-reset cycle.
    pub fn drain(&mut self) -> Vec<(PublicKey, SocketAddr)> {
        self.last_run = Instant::now();
        let drained: Vec<_> = self.entries.iter()
            .filter_map(|e| e.map(|e| (e.pk, e.saddr)))
            .collect();
        for slot in &mut self.entries {
            *slot = None;
        }
        drained
    }

    /// Feed every drained candidate into `bucket` as a to-try insertion -
    /// convenience used by `Server::do_toping`.
    pub fn drain_into(&mut self, bucket: &mut Bucket, pivot: &PublicKey, bad_node_timeout: ::std::time::Duration) {
        for (pk, saddr) in self.drain() {
            bucket.add_or_update(pivot, pk, saddr, bad_node_timeout);
        }
    }
}

fn xor_distance(pivot: &PublicKey, other: &PublicKey) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = pivot.0[i] ^ other.0[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::gen_keypair;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn fills_then_drains() {
        let self_pk = gen_keypair().0;
        let mut queue = ToPingQueue::with_capacity(2);
        let a = gen_keypair().0;
        let b = gen_keypair().0;
        assert!(queue.try_add(&self_pk, a, addr(1)));
        assert!(queue.try_add(&self_pk, b, addr(2)));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let self_pk = gen_keypair().0;
        let mut queue = ToPingQueue::with_capacity(2);
        let a = gen_keypair().0;
        assert!(queue.try_add(&self_pk, a, addr(1)));
        assert!(queue.try_add(&self_pk, a, addr(2)));
        assert_eq!(queue.drain().len(), 1);
    }
}
