// Ed25519 primitives for node identity and message signing.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

/// Size of an Ed25519 secret key in bytes.
pub const SECRET_KEY_SIZE: usize = SECRET_KEY_LENGTH;

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = SIGNATURE_LENGTH;

#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    #[error("Invalid secret key length: expected {}, got {}", SECRET_KEY_SIZE, _0)]
    InvalidSecretKeyLength(usize),

    #[error("Invalid public key length: expected {}, got {}", PUBLIC_KEY_SIZE, _0)]
    InvalidPublicKeyLength(usize),

    #[error("Invalid signature length: expected {}, got {}", SIGNATURE_SIZE, _0)]
    InvalidSignatureLength(usize),

    #[error("Failed to parse public key")]
    InvalidPublicKey,

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Invalid hex string: {0}")]
    HexError(String),
}

/// Ed25519 secret key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidSecretKeyLength(slice.len()));
        }
        let mut bytes = [0u8; SECRET_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex).map_err(|e| CryptoError::HexError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex")] [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidPublicKeyLength(slice.len()));
        }
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let dalek_sig = DalekSignature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &dalek_sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serializer for PublicKey {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_bytes_32()?))
    }

    fn size(&self) -> usize {
        PUBLIC_KEY_SIZE
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignatureLength(slice.len()));
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serializer for Signature {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_bytes_64()?))
    }

    fn size(&self) -> usize {
        SIGNATURE_SIZE
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        let bytes = hex::decode(hex).map_err(serde::de::Error::custom)?;
        Signature::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Signing keypair for a node.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_secret(secret: &SecretKey) -> Self {
        let signing_key = SigningKey::from_bytes(secret.as_bytes());
        Self { signing_key }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn secret_key(&self) -> SecretKey {
        SecretKey(self.signing_key.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature(signature.to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.public_key().to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"message");
        assert!(keypair.public_key().verify(b"message", &signature).is_ok());
        assert!(keypair.public_key().verify(b"other", &signature).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = keypair.sign(b"message");
        assert!(other.public_key().verify(b"message", &signature).is_err());
    }

    #[test]
    fn test_keypair_from_secret_is_stable() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_secret(&keypair.secret_key());
        assert_eq!(keypair.public_key(), restored.public_key());
    }

    #[test]
    fn test_signature_serializer_round_trip() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"payload");
        let bytes: [u8; SIGNATURE_SIZE] = Serializer::to_bytes(&signature).try_into().unwrap();
        assert_eq!(signature, Signature::from_bytes(bytes));
    }
}
