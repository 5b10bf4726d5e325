/*! Crate-wide error type.

Every fallible operation in `driftnet` that isn't a plain "drop the packet"
silent failure returns `Result<T, CoreError>`. Silent-drop cases (a bad MAC,
an unsolicited reply, a short datagram) are *not* represented here - per
§7 of the design, those never leave the handler that observed them.
*/

use std::io;

/// Error conditions that can be reported back to a caller, as opposed to
/// the purely internal "drop this packet" outcomes handled inline by the
/// dispatch loop.
#[derive(Debug, Fail)]
pub enum CoreError {
    /// A bounded table (ping table, rendezvous store, to-ping queue) had no
    /// free or replaceable slot for a new entry.
    #[fail(display = "no free slot available in {}", table)]
    NoSlot {
        /// Name of the table that rejected the insert, for logging.
        table: &'static str,
    },

    /// Bytes did not parse as the expected packet/payload type.
    #[fail(display = "failed to deserialize {}", what)]
    Deserialize {
        /// What we were trying to parse, for logging.
        what: &'static str,
    },

    /// Decryption failed (bad MAC or wrong key).
    #[fail(display = "failed to decrypt {}", what)]
    Decrypt {
        /// What we were trying to decrypt, for logging.
        what: &'static str,
    },

    /// The referenced friend is not in the friend list.
    #[fail(display = "unknown friend")]
    UnknownFriend,

    /// Underlying I/O failure (socket send, DNS resolution, file access).
    #[fail(display = "I/O error: {}", _0)]
    Io(#[cause] io::Error),
}

impl From<io::Error> for CoreError {
    fn from(e: io::Error) -> Self {
        CoreError::Io(e)
    }
}

/// Shorthand used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;
