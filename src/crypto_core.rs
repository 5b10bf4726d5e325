/*! Thin wrapper around `sodiumoxide`'s `crypto_box` primitives.

Every DHT packet's encrypted payload goes through [`seal`](./fn.seal.html)/
[`open`](./fn.open.html) (or their precomputed-key counterparts). Failure is
represented as `None`/`Err(())` rather than a panic: a bad MAC is an
everyday occurrence on a public UDP port, not a bug.
*/

use byteorder::{BigEndian, ByteOrder};
use sodiumoxide::crypto::box_;
use sodiumoxide::randombytes::randombytes_into;

use binary_io::*;

pub use sodiumoxide::crypto::box_::{PublicKey, SecretKey, Nonce, PrecomputedKey};
pub use sodiumoxide::crypto::box_::{PUBLICKEYBYTES, SECRETKEYBYTES, NONCEBYTES, MACBYTES};

/// Must be called once, before any other function in this module, so that
/// libsodium's internal state is initialized. Idempotent and cheap to call
/// redundantly.
pub fn crypto_init() {
    sodiumoxide::init().expect("libsodium initialization failed");
}

/// Generate a new key pair.
pub fn gen_keypair() -> (PublicKey, SecretKey) {
    box_::gen_keypair()
}

/// Generate a new random nonce.
pub fn gen_nonce() -> Nonce {
    box_::gen_nonce()
}

/// Generate a cryptographically random `u64`, used for ping ids and
/// rendezvous/NAT ping challenge values.
pub fn random_u64() -> u64 {
    let mut bytes = [0; 8];
    randombytes_into(&mut bytes);
    BigEndian::read_u64(&bytes)
}

/// Generate a cryptographically random `u32`, used when picking a random
/// index into a bucket or friend client list.
pub fn random_u32() -> u32 {
    let mut bytes = [0; 4];
    randombytes_into(&mut bytes);
    BigEndian::read_u32(&bytes)
}

/// Authenticated-encrypt `plaintext` for `their_public_key`, using
/// `our_secret_key` and `nonce`. Output is `plaintext.len() + MACBYTES`.
pub fn seal(plaintext: &[u8], nonce: &Nonce, their_public_key: &PublicKey, our_secret_key: &SecretKey) -> Vec<u8> {
    box_::seal(plaintext, nonce, their_public_key, our_secret_key)
}

/// Decrypt and authenticate `ciphertext` sent by `their_public_key`.
/// Returns `Err(())` silently on any MAC mismatch - there is no partial
/// success.
pub fn open(ciphertext: &[u8], nonce: &Nonce, their_public_key: &PublicKey, our_secret_key: &SecretKey) -> Result<Vec<u8>, ()> {
    box_::open(ciphertext, nonce, their_public_key, our_secret_key)
}

/// Precompute the shared key for a (their_public, our_secret) pair so that
/// repeated packets to/from the same peer skip the scalar multiplication.
pub fn precompute(their_public_key: &PublicKey, our_secret_key: &SecretKey) -> PrecomputedKey {
    box_::precompute(their_public_key, our_secret_key)
}

/// `seal` using an already-`precompute`d shared key.
pub fn seal_precomputed(plaintext: &[u8], nonce: &Nonce, shared_key: &PrecomputedKey) -> Vec<u8> {
    box_::seal_precomputed(plaintext, nonce, shared_key)
}

/// `open` using an already-`precompute`d shared key.
pub fn open_precomputed(ciphertext: &[u8], nonce: &Nonce, shared_key: &PrecomputedKey) -> Result<Vec<u8>, ()> {
    box_::open_precomputed(ciphertext, nonce, shared_key)
}

/// Increment a nonce's 24 bytes as one big big-endian integer, wrapping on
/// overflow. Used to keep a fresh nonce per packet within a NAT-ping
/// exchange without burning a random nonce draw for each one.
pub fn increment_nonce(nonce: &mut Nonce) {
    let Nonce(ref mut bytes) = *nonce;
    let mut carry: u16 = 1;
    for byte in bytes.iter_mut().rev() {
        let sum = u16::from(*byte) + carry;
        *byte = sum as u8;
        carry = sum >> 8;
    }
}

impl ToBytes for PublicKey {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf, gen_slice!(self.0))
    }
}

impl FromBytes for PublicKey {
    named!(from_bytes<&[u8], PublicKey>, map_opt!(take!(PUBLICKEYBYTES), PublicKey::from_slice));
}

impl ToBytes for Nonce {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf, gen_slice!(self.0))
    }
}

impl FromBytes for Nonce {
    named!(from_bytes<&[u8], Nonce>, map_opt!(take!(NONCEBYTES), Nonce::from_slice));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        crypto_init();
        let (alice_pk, alice_sk) = gen_keypair();
        let (bob_pk, bob_sk) = gen_keypair();
        let nonce = gen_nonce();
        let plaintext = b"hello from alice";

        let ciphertext = seal(plaintext, &nonce, &bob_pk, &alice_sk);
        let decrypted = open(&ciphertext, &nonce, &alice_pk, &bob_sk).unwrap();
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        crypto_init();
        let (alice_pk, alice_sk) = gen_keypair();
        let (bob_pk, bob_sk) = gen_keypair();
        let nonce = gen_nonce();
        let plaintext = b"hello from alice";

        let mut ciphertext = seal(plaintext, &nonce, &bob_pk, &alice_sk);
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;

        assert!(open(&ciphertext, &nonce, &alice_pk, &bob_sk).is_err());
    }

    #[test]
    fn precomputed_round_trip_matches_sealed() {
        crypto_init();
        let (alice_pk, alice_sk) = gen_keypair();
        let (bob_pk, bob_sk) = gen_keypair();
        let nonce = gen_nonce();
        let plaintext = b"precomputed path";

        let shared_a = precompute(&bob_pk, &alice_sk);
        let shared_b = precompute(&alice_pk, &bob_sk);

        let ciphertext = seal_precomputed(plaintext, &nonce, &shared_a);
        let decrypted = open_precomputed(&ciphertext, &nonce, &shared_b).unwrap();
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn nonce_increment_wraps() {
        let mut nonce = Nonce([0xff; NONCEBYTES]);
        increment_nonce(&mut nonce);
        assert_eq!(nonce, Nonce([0; NONCEBYTES]));
    }

    #[test]
    fn nonce_increment_carries_across_bytes() {
        let mut bytes = [0; NONCEBYTES];
        bytes[NONCEBYTES - 1] = 0xfe;
        let mut nonce = Nonce(bytes);
        for _ in 0..255 {
            increment_nonce(&mut nonce);
        }
        let mut expected = [0; NONCEBYTES];
        expected[NONCEBYTES - 2] = 0x01;
        expected[NONCEBYTES - 1] = 0xfd;
        assert_eq!(nonce, Nonce(expected));
    }
}
