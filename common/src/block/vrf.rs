// VRF attachments carried by packager messages and block messages.

use serde::{Deserialize, Serialize};

use crate::block::Height;
use crate::crypto::{
    vrf::{self, VrfError, VrfOutput, VrfProof},
    Hash, PublicKey,
};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

/// The claim half of a VRF attachment: the output and the context it was
/// produced for.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VrfData {
    pub output: VrfOutput,
    /// Chain height the peer-set snapshot was taken at
    pub height: Height,
    /// Set when the attachment is bound to one transaction
    pub tx_hash: Option<Hash>,
}

impl Serializer for VrfData {
    fn write(&self, writer: &mut Writer) {
        self.output.write(writer);
        writer.write_u64(self.height);
        self.tx_hash.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            output: VrfOutput::read(reader)?,
            height: reader.read_u64()?,
            tx_hash: Option::read(reader)?,
        })
    }
}

/// A complete VRF attachment: claim, proof and the proving key.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VrfInfo {
    pub data: VrfData,
    pub pubkey: PublicKey,
    pub proof: VrfProof,
}

impl VrfInfo {
    /// Check the proof against an input reconstructed by the receiver.
    pub fn verify(&self, input: &[u8]) -> Result<(), VrfError> {
        vrf::verify(&self.pubkey, input, &self.data.output, &self.proof)
    }
}

impl Serializer for VrfInfo {
    fn write(&self, writer: &mut Writer) {
        self.data.write(writer);
        self.pubkey.write(writer);
        self.proof.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            data: VrfData::read(reader)?,
            pubkey: PublicKey::read(reader)?,
            proof: VrfProof::read(reader)?,
        })
    }
}
