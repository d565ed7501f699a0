use serde::{Deserialize, Serialize};

use crate::{
    crypto::{hash, Address, Hash, KeyPair, PublicKey, Signature},
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampMicros,
};

mod payload;

pub use payload::{CallContractPayload, DeployContractPayload, TransferPayload};

// this enum represents all types of transaction available on the Crest chain
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Transfer,
    DeployContract,
    CallContract,
    Stake,
    Unstake,
}

impl TxType {
    /// Contract transactions go through the dispatcher/packager path,
    /// everything else through the ordinary pool.
    pub fn is_contract(&self) -> bool {
        matches!(self, TxType::DeployContract | TxType::CallContract)
    }
}

impl Serializer for TxType {
    fn write(&self, writer: &mut Writer) {
        let value = match self {
            TxType::Transfer => 0u8,
            TxType::DeployContract => 1,
            TxType::CallContract => 2,
            TxType::Stake => 3,
            TxType::Unstake => 4,
        };
        writer.write_u8(value);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(TxType::Transfer),
            1 => Ok(TxType::DeployContract),
            2 => Ok(TxType::CallContract),
            3 => Ok(TxType::Stake),
            4 => Ok(TxType::Unstake),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1
    }
}

/// A spent output reference. Two transactions conflict when they share one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxInput {
    /// Hash of the transaction that created the output
    pub utxo: Hash,
    /// Output index inside that transaction
    pub index: u16,
}

impl Serializer for TxInput {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.utxo);
        writer.write_u16(self.index);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            utxo: reader.read_hash()?,
            index: reader.read_u16()?,
        })
    }

    fn size(&self) -> usize {
        32 + 2
    }
}

// Transaction to be sent over the network
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Transaction {
    /// Version of the transaction format
    version: u32,
    /// Type tag deciding which pipeline handles it
    tx_type: TxType,
    // Submitter identity, base58
    identity: Address,
    /// Creation time in microseconds UTC
    time: TimestampMicros,
    /// Outputs spent by this transaction
    inputs: Vec<TxInput>,
    /// JSON payload; contract transactions carry the call/deploy description
    data: String,
    /// Key the signature verifies against
    pubkey: Option<PublicKey>,
    /// Signature over the canonical serialization with both fields cleared
    signature: Option<Signature>,
}

impl Transaction {
    pub fn new(
        version: u32,
        tx_type: TxType,
        identity: Address,
        time: TimestampMicros,
        inputs: Vec<TxInput>,
        data: String,
    ) -> Self {
        Self {
            version,
            tx_type,
            identity,
            time,
            inputs,
            data,
            pubkey: None,
            signature: None,
        }
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_tx_type(&self) -> TxType {
        self.tx_type
    }

    pub fn get_identity(&self) -> &Address {
        &self.identity
    }

    pub fn get_time(&self) -> TimestampMicros {
        self.time
    }

    pub fn get_inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn get_data(&self) -> &str {
        &self.data
    }

    pub fn get_signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_contract(&self) -> bool {
        self.tx_type.is_contract()
    }

    /// Parse the JSON data blob into a typed payload.
    pub fn parse_data<'a, T: Deserialize<'a>>(&'a self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }

    // Canonical bytes with the signature fields cleared. The content hash
    // and the signing input are both computed over this form.
    fn write_no_signature(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        self.tx_type.write(writer);
        self.identity.write(writer);
        writer.write_u64(self.time);
        self.inputs.write(writer);
        writer.write_string(&self.data);
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        self.write_no_signature(&mut writer);
        buffer
    }

    /// Stable content hash: blake3 over the signature-cleared serialization.
    pub fn hash(&self) -> Hash {
        hash(&self.signing_bytes())
    }

    /// Sign with the submitter key, filling pubkey and signature.
    pub fn sign(&mut self, keypair: &KeyPair) {
        let bytes = self.signing_bytes();
        self.pubkey = Some(keypair.public_key());
        self.signature = Some(keypair.sign(&bytes));
    }

    /// Check the embedded signature, and that the signing key matches the
    /// claimed identity.
    pub fn verify_signature(&self) -> bool {
        let (Some(pubkey), Some(signature)) = (&self.pubkey, &self.signature) else {
            return false;
        };
        if Address::from_public_key(pubkey) != self.identity {
            return false;
        }
        pubkey.verify(&self.signing_bytes(), signature).is_ok()
    }
}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        self.write_no_signature(writer);
        self.pubkey.write(writer);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            version: reader.read_u32()?,
            tx_type: TxType::read(reader)?,
            identity: Address::read(reader)?,
            time: reader.read_u64()?,
            inputs: Vec::read(reader)?,
            data: reader.read_string()?,
            pubkey: Option::read(reader)?,
            signature: Option::read(reader)?,
        })
    }
}
