// Verifiable random function built on Ed25519.
//
// prove(input) signs the input with the node key; the proof IS the
// signature and the output is SHA-256 of it. Ed25519 signing is
// deterministic, so the same key and input always yield the same output,
// and any holder of the public key can check both the signature and the
// output derivation. The output maps to a number in [0, 1) for packager
// selection.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::crypto::{KeyPair, PublicKey, Signature, SIGNATURE_SIZE};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

pub const VRF_OUTPUT_SIZE: usize = 32;
pub const VRF_PROOF_SIZE: usize = SIGNATURE_SIZE;

#[derive(Debug, Error)]
pub enum VrfError {
    #[error("VRF proof verification failed")]
    InvalidProof,

    #[error("VRF output does not match the proof")]
    OutputMismatch,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfOutput([u8; VRF_OUTPUT_SIZE]);

impl VrfOutput {
    pub fn from_bytes(bytes: [u8; VRF_OUTPUT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VRF_OUTPUT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Map the output onto [0, 1). The first 8 bytes are taken big-endian
    /// and divided by 2^64, so every node derives the same number.
    pub fn to_unit_interval(&self) -> f64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(raw) as f64 / (u64::MAX as f64 + 1.0)
    }
}

impl fmt::Debug for VrfOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfOutput({})", self.to_hex())
    }
}

impl Serializer for VrfOutput {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_bytes_32()?))
    }

    fn size(&self) -> usize {
        VRF_OUTPUT_SIZE
    }
}

impl Serialize for VrfOutput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for VrfOutput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        let bytes = hex::decode(hex).map_err(serde::de::Error::custom)?;
        let bytes: [u8; VRF_OUTPUT_SIZE] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid VRF output length"))?;
        Ok(Self(bytes))
    }
}

pub type VrfProof = Signature;

/// Compute SHA-256 of arbitrary bytes. VRF inputs and outputs use SHA-256
/// rather than the chain content hash.
pub fn sha256(value: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value);
    hasher.finalize().into()
}

/// Produce the VRF output and proof for an input under the node key.
pub fn prove(keypair: &KeyPair, input: &[u8]) -> (VrfOutput, VrfProof) {
    let proof = keypair.sign(input);
    let output = VrfOutput(sha256(proof.as_bytes()));
    (output, proof)
}

/// Verify an `(input, output, proof)` triple against a public key.
pub fn verify(
    public_key: &PublicKey,
    input: &[u8],
    output: &VrfOutput,
    proof: &VrfProof,
) -> Result<(), VrfError> {
    public_key
        .verify(input, proof)
        .map_err(|_| VrfError::InvalidProof)?;
    if sha256(proof.as_bytes()) != output.0 {
        return Err(VrfError::OutputMismatch);
    }
    Ok(())
}
