// Base58check node and contract addresses.
//
// An address is derived from a public key (or from a raw EVM-style address
// for contract owners) by hashing, truncating to 20 bytes and base58check
// encoding with a version prefix. The string form is the canonical identity
// used in peer lists, elections and the dirty-contract declarations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ADDRESS_VERSION_PREFIX;
use crate::crypto::{hash, PublicKey};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

// 20-byte payload before base58check encoding
const ADDRESS_PAYLOAD_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid base58check encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid address version byte: {0}")]
    InvalidVersion(u8),

    #[error("Invalid address payload length: {0}")]
    InvalidLength(usize),

    #[error("Invalid EVM address hex: {0}")]
    InvalidEvmHex(String),
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Derive the address of a node from its signing public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = hash(public_key.as_bytes());
        Self::from_payload(&digest.as_bytes()[..ADDRESS_PAYLOAD_SIZE])
    }

    /// Translate an EVM-style hex address (with or without 0x prefix) into
    /// its base58 form. Contract owners declare themselves with the EVM
    /// form; everything else in the node speaks base58.
    pub fn from_evm_hex(evm_hex: &str) -> Result<Self, AddressError> {
        let stripped = evm_hex.strip_prefix("0x").unwrap_or(evm_hex);
        let bytes =
            hex::decode(stripped).map_err(|e| AddressError::InvalidEvmHex(e.to_string()))?;
        if bytes.len() != ADDRESS_PAYLOAD_SIZE {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        Ok(Self::from_payload(&bytes))
    }

    fn from_payload(payload: &[u8]) -> Self {
        debug_assert_eq!(payload.len(), ADDRESS_PAYLOAD_SIZE);
        let mut versioned = Vec::with_capacity(1 + ADDRESS_PAYLOAD_SIZE);
        versioned.push(ADDRESS_VERSION_PREFIX);
        versioned.extend_from_slice(payload);
        Address(bs58::encode(versioned).with_check().into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The EVM-style hex form of this address (no 0x prefix). Inverse of
    /// `from_evm_hex` up to case.
    pub fn to_evm_hex(&self) -> String {
        let decoded = bs58::decode(&self.0)
            .with_check(None)
            .into_vec()
            .expect("constructed addresses are valid base58check");
        hex::encode(&decoded[1..])
    }

    /// Check the base58check structure without constructing an Address.
    pub fn is_valid(candidate: &str) -> bool {
        candidate.parse::<Address>().is_ok()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        if decoded.len() != 1 + ADDRESS_PAYLOAD_SIZE {
            return Err(AddressError::InvalidLength(decoded.len()));
        }
        if decoded[0] != ADDRESS_VERSION_PREFIX {
            return Err(AddressError::InvalidVersion(decoded[0]));
        }
        Ok(Address(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl Serializer for Address {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let raw = reader.read_string()?;
        raw.parse().map_err(|_| ReaderError::InvalidValue)
    }
}
