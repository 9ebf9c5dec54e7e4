//!
//! Time-ordered identifiers
//! ------------------------
//! 128-bit identifiers in the UUID-v7 layout (RFC 9562): a 48-bit big-endian
//! millisecond Unix timestamp, a 4-bit version tag, 12 random bits, a 2-bit
//! variant tag and 62 more random bits. Values are roughly time-ordered and
//! unique without coordination; collisions within one millisecond are
//! resolved by the random fields, so the timestamp need not be monotonic.
//!
//! Randomness comes from a [`UidGenerator`] instance that owns a seeded PRNG
//! behind a mutex. Generators are shared by `Arc` and injected into whatever
//! needs to mint identifiers; there is no ambient global source.

use std::fmt;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const MASK_48: u64 = (1 << 48) - 1;
const MASK_12: u64 = (1 << 12) - 1;
const MASK_62: u64 = (1 << 62) - 1;

/// An opaque 128-bit identifier. The all-zero value is the nil identifier
/// and is never produced by a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Uid([u8; 16]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UidError {
    #[error("identifier must be exactly 36 characters")]
    BadLength,
    #[error("identifier does not match the 8-4-4-4-12 hex grouping")]
    BadFormat,
}

impl Uid {
    pub const NIL: Uid = Uid([0; 16]);

    pub fn from_bytes(bytes: [u8; 16]) -> Uid {
        Uid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == Uid::NIL
    }

    /// The embedded creation timestamp, in Unix milliseconds.
    pub fn timestamp_ms(&self) -> u64 {
        let mut ts = 0u64;
        for b in &self.0[..6] {
            ts = ts << 8 | u64::from(*b);
        }
        ts
    }

    /// Parse the canonical text form: five hyphen-separated lowercase or
    /// uppercase hex groups of lengths 8-4-4-4-12, 36 characters total.
    /// Anything else is rejected.
    pub fn parse(s: &str) -> Result<Uid, UidError> {
        let b = s.as_bytes();
        if b.len() != 36 {
            return Err(UidError::BadLength);
        }
        if b[8] != b'-' || b[13] != b'-' || b[18] != b'-' || b[23] != b'-' {
            return Err(UidError::BadFormat);
        }

        let mut out = [0u8; 16];
        let mut nibbles = b
            .iter()
            .enumerate()
            .filter(|(i, _)| !matches!(i, 8 | 13 | 18 | 23))
            .map(|(_, c)| hex_val(*c));

        for byte in out.iter_mut() {
            let (hi, lo) = (nibbles.next(), nibbles.next());
            match (hi, lo) {
                (Some(Some(hi)), Some(Some(lo))) => *byte = hi << 4 | lo,
                _ => return Err(UidError::BadFormat),
            }
        }

        Ok(Uid(out))
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15],
        )
    }
}

impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Uid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uid::parse(&s).map_err(de::Error::custom)
    }
}

/// Mints UUID-v7 identifiers. Safe to share across threads; concurrent
/// callers serialize only on the short critical section that draws random
/// bits from the owned PRNG.
pub struct UidGenerator {
    source: Mutex<StdRng>,
}

impl UidGenerator {
    /// Create a generator seeded from OS entropy.
    pub fn new() -> UidGenerator {
        UidGenerator { source: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn next(&self) -> Uid {
        const VERSION: u8 = 0b0111;
        const VARIANT: u8 = 0b10;

        let ts = chrono::Utc::now().timestamp_millis() as u64 & MASK_48;

        let (rand_a, rand_b) = {
            let mut source = self.source.lock();
            (source.gen::<u64>() & MASK_12, source.gen::<u64>() & MASK_62)
        };

        Uid([
            (ts >> 0x28) as u8,
            (ts >> 0x20) as u8,
            (ts >> 0x18) as u8,
            (ts >> 0x10) as u8,
            (ts >> 0x08) as u8,
            ts as u8,
            VERSION << 4 | (rand_a >> 8) as u8,
            rand_a as u8,
            VARIANT << 6 | (rand_b >> 0x38) as u8,
            (rand_b >> 0x30) as u8,
            (rand_b >> 0x28) as u8,
            (rand_b >> 0x20) as u8,
            (rand_b >> 0x18) as u8,
            (rand_b >> 0x10) as u8,
            (rand_b >> 0x08) as u8,
            rand_b as u8,
        ])
    }
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_and_variant_bits() {
        let gen = UidGenerator::new();
        for _ in 0..64 {
            let uid = gen.next();
            let b = uid.as_bytes();
            assert_eq!(b[6] >> 4, 0b0111, "version tag");
            assert_eq!(b[8] >> 6, 0b10, "variant tag");
            assert!(!uid.is_nil());
        }
    }

    #[test]
    fn embeds_current_timestamp() {
        let before = chrono::Utc::now().timestamp_millis() as u64;
        let uid = UidGenerator::new().next();
        let after = chrono::Utc::now().timestamp_millis() as u64;
        assert!(uid.timestamp_ms() >= before && uid.timestamp_ms() <= after);
    }

    #[test]
    fn display_parse_round_trip() {
        let gen = UidGenerator::new();
        for _ in 0..256 {
            let uid = gen.next();
            let text = uid.to_string();
            assert_eq!(text.len(), 36);
            assert_eq!(Uid::parse(&text), Ok(uid));
        }
    }

    #[test]
    fn parse_rejects_malformed_input() {
        // wrong length
        assert_eq!(Uid::parse(""), Err(UidError::BadLength));
        assert_eq!(
            Uid::parse("0191b6a0-0000-7000-8000-00000000000"),
            Err(UidError::BadLength)
        );
        // hyphens in the wrong place
        assert_eq!(
            Uid::parse("0191b6a000-00-7000-8000-000000000000"),
            Err(UidError::BadFormat)
        );
        // non-hex characters
        assert_eq!(
            Uid::parse("0191b6a0-0000-7000-8000-00000000000g"),
            Err(UidError::BadFormat)
        );
        // a valid one, for contrast
        assert!(Uid::parse("0191b6a0-0000-7000-8000-000000000000").is_ok());
    }

    #[test]
    fn parse_rejects_embedded_hyphen_shuffle() {
        // 36 chars, right characters, wrong grouping
        assert_eq!(
            Uid::parse("0191b6a00000-7000-8000-0000000000-00"),
            Err(UidError::BadFormat)
        );
    }

    #[test]
    fn serde_uses_canonical_text() {
        let uid = UidGenerator::new().next();
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, format!("\"{uid}\""));
        let back: Uid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uid);

        let bad: Result<Uid, _> = serde_json::from_str("\"not-a-uid\"");
        assert!(bad.is_err());
    }

    #[test]
    fn nil_is_distinguished() {
        assert!(Uid::NIL.is_nil());
        assert_eq!(Uid::NIL.to_string(), "00000000-0000-0000-0000-000000000000");
    }
}
