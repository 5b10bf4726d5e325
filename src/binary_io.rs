/*! Traits and helpers for turning wire structs into bytes and back.

All packet types in the crate implement [`ToBytes`](./trait.ToBytes.html)
with `cookie-factory`'s `do_gen!` and [`FromBytes`](./trait.FromBytes.html)
with `nom`'s `named!`/`do_parse!`. Keeping both directions as trait methods
means a packet enum can dispatch to whichever variant it holds without a
`match` repeated at every call site.
*/

pub use cookie_factory::GenError;
pub use nom::IResult;

/// Largest single UDP datagram this crate will ever construct. Bootstrap
/// nodes configured with jumbo MTUs still see a non-fragmenting payload.
pub const MAX_DHT_PACKET_SIZE: usize = 2048;

/// Serialize `self` into `buf`, returning the advanced buffer and write
/// position on success.
///
/// Mirrors `cookie_factory`'s own generator signature so that `to_bytes` can
/// be used directly inside `do_gen!` via `gen_call!`.
pub trait ToBytes {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError>;
}

/// Parse `Self` out of a byte slice with `nom`.
///
/// Implementations are written with `named!` so parse errors compose the
/// same way any other `nom` combinator does.
pub trait FromBytes: Sized {
    named!(from_bytes<&[u8], Self>);
}

/// Serialize a [`ToBytes`](./trait.ToBytes.html) value into a freshly
/// allocated, exactly-sized `Vec<u8>`.
///
/// Convenience used by tests and by callers that don't want to manage a
/// scratch buffer themselves.
pub fn to_bytes_vec<T: ToBytes>(value: &T) -> Vec<u8> {
    let mut buf = [0; MAX_DHT_PACKET_SIZE];
    let (_, size) = value.to_bytes((&mut buf, 0))
        .expect("buffer too small for ToBytes::to_bytes");
    buf[..size].to_vec()
}

#[cfg(test)]
#[macro_use]
pub mod test_macros {
    /// Encode then decode `$value`, asserting the round trip is lossless.
    macro_rules! encode_decode_test {
        ($test_name:ident, $value:expr) => {
            #[test]
            fn $test_name() {
                use $crate::binary_io::*;
                let value = $value;
                let mut buf = [0; MAX_DHT_PACKET_SIZE];
                let (_, size) = value.to_bytes((&mut buf, 0)).unwrap();
                let (rest, decoded) = FromBytes::from_bytes(&buf[..size]).unwrap();
                assert!(rest.is_empty());
                assert_eq!(value, decoded);
            }
        }
    }
}
