use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string, nibble};
use crate::HashError;

/// Length of a SHA-1 digest in bytes.
pub const SHA1_DIGEST_LENGTH: usize = 20;

/// A git object identifier — the SHA-1 hash of an object's content.
///
/// Ordered lexicographically over the raw digest bytes, which is the
/// order pack indexes and id sets rely on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; SHA1_DIGEST_LENGTH]);

impl ObjectId {
    /// Create an ObjectId from raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != SHA1_DIGEST_LENGTH {
            return Err(HashError::InvalidDigestLength {
                expected: SHA1_DIGEST_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SHA1_DIGEST_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Create an ObjectId from a 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let mut bytes = [0u8; SHA1_DIGEST_LENGTH];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; SHA1_DIGEST_LENGTH] {
        &self.0
    }

    /// First byte of the digest (fanout bucket).
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Hex string representation (lowercase).
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }

    /// Loose object path component: `"xx/xxxx..."`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }

    /// Does this id's hex form start with the given prefix?
    pub fn matches_prefix(&self, prefix: &IdPrefix) -> bool {
        let full = prefix.hex_len / 2;
        if self.0[..full] != prefix.bytes[..full] {
            return false;
        }
        if prefix.hex_len % 2 == 1 {
            (self.0[full] >> 4) == (prefix.bytes[full] >> 4)
        } else {
            true
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A partial object id parsed from a hex prefix.
///
/// Prefix lookups require at least two hex characters; shorter or
/// non-hex input is rejected as a bad object id string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdPrefix {
    bytes: [u8; SHA1_DIGEST_LENGTH],
    hex_len: usize,
}

impl IdPrefix {
    /// Parse a hex prefix of 2..=40 characters.
    pub fn parse(s: &str) -> Result<Self, HashError> {
        if s.len() < 2 || s.len() > SHA1_DIGEST_LENGTH * 2 {
            return Err(HashError::BadIdString(s.to_string()));
        }
        let mut bytes = [0u8; SHA1_DIGEST_LENGTH];
        for (i, b) in s.bytes().enumerate() {
            let Some(v) = nibble(b) else {
                return Err(HashError::BadIdString(s.to_string()));
            };
            if i % 2 == 0 {
                bytes[i / 2] = v << 4;
            } else {
                bytes[i / 2] |= v;
            }
        }
        Ok(Self {
            bytes,
            hex_len: s.len(),
        })
    }

    /// The fanout bucket this prefix falls into.
    pub fn first_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// Number of hex characters in the prefix.
    pub fn hex_len(&self) -> usize {
        self.hex_len
    }

    /// Is this a full 40-character id?
    pub fn is_full(&self) -> bool {
        self.hex_len == SHA1_DIGEST_LENGTH * 2
    }

    /// Convert a full-length prefix into an ObjectId.
    pub fn to_id(&self) -> Option<ObjectId> {
        self.is_full().then_some(ObjectId(self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn from_hex_round_trip() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(oid.to_hex(), HEX);
        let parsed: ObjectId = HEX.parse().unwrap();
        assert_eq!(parsed, oid);
    }

    #[test]
    fn from_bytes_wrong_length() {
        let err = ObjectId::from_bytes(&[0; 10]).unwrap_err();
        assert!(matches!(
            err,
            HashError::InvalidDigestLength { expected: 20, actual: 10 }
        ));
    }

    #[test]
    fn ordering_is_byte_order() {
        let a = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let b = ObjectId::from_hex("0000000000000000000000000000000000000002").unwrap();
        assert!(a < b);
    }

    #[test]
    fn debug_shows_short_hash() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(format!("{oid:?}"), "ObjectId(da39a3ee)");
    }

    #[test]
    fn loose_path_split() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(oid.loose_path(), format!("da/{}", &HEX[2..]));
    }

    #[test]
    fn prefix_requires_two_hex_chars() {
        assert!(IdPrefix::parse("c").is_err());
        assert!(IdPrefix::parse("").is_err());
        assert!(IdPrefix::parse("zz").is_err());
        assert!(IdPrefix::parse("ce").is_ok());
    }

    #[test]
    fn prefix_matching_even_and_odd() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        for len in 2..=9 {
            let p = IdPrefix::parse(&HEX[..len]).unwrap();
            assert!(oid.matches_prefix(&p), "prefix length {len}");
        }
        let other = IdPrefix::parse("da3a").unwrap();
        assert!(!oid.matches_prefix(&other));
        let odd = IdPrefix::parse("da39a").unwrap();
        assert!(oid.matches_prefix(&odd));
    }

    #[test]
    fn full_prefix_converts_to_id() {
        let p = IdPrefix::parse(HEX).unwrap();
        assert!(p.is_full());
        assert_eq!(p.to_id().unwrap().to_hex(), HEX);
        let short = IdPrefix::parse("da39").unwrap();
        assert_eq!(short.to_id(), None);
    }
}
