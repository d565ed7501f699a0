// Content addressing for the chain.
//
// Every transaction, block and merkle node is identified by a 32-byte
// blake3 digest. Hashes display and serde as lowercase hex; the raw byte
// form goes through the Serializer layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

pub const HASH_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum HashParseError {
    #[error("Hash hex must be {expected} characters, got {0}", expected = HASH_SIZE * 2)]
    InvalidLength(usize),

    #[error("Invalid hash hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 32-byte content hash.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash, used where no predecessor exists.
    pub const fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, HashParseError> {
        if value.len() != HASH_SIZE * 2 {
            return Err(HashParseError::InvalidLength(value.len()));
        }
        let decoded = hex::decode(value)?;
        let bytes: [u8; HASH_SIZE] = decoded.try_into().expect("length checked");
        Ok(Self(bytes))
    }
}

/// Digest a byte string into a chain content hash.
#[inline]
pub fn hash(value: &[u8]) -> Hash {
    Hash(blake3::hash(value).into())
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Serializer for Hash {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_hash()
    }

    fn size(&self) -> usize {
        HASH_SIZE
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Hash::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash(b"crest");
        let b = hash(b"crest");
        assert_eq!(a, b);
        assert_ne!(a, hash(b"crest2"));
    }

    #[test]
    fn test_hex_round_trip() {
        let h = hash(b"round trip");
        let parsed: Hash = h.to_hex().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(
            Hash::from_hex("abcd"),
            Err(HashParseError::InvalidLength(4))
        ));
        let not_hex = "zz".repeat(HASH_SIZE);
        assert!(matches!(
            Hash::from_hex(&not_hex),
            Err(HashParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_serializer_round_trip() {
        let h = hash(b"bytes");
        let decoded = Hash::from_bytes(&Serializer::to_bytes(&h)).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn test_serde_rejects_bad_length() {
        let result: Result<Hash, _> = serde_json::from_str("\"abcd\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_display_and_debug_are_hex() {
        let h = Hash::zero();
        assert_eq!(format!("{}", h), "0".repeat(HASH_SIZE * 2));
        assert_eq!(format!("{:?}", h), format!("Hash({})", "0".repeat(HASH_SIZE * 2)));
    }
}
