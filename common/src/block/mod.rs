use serde::{Deserialize, Serialize};

use crate::{
    crypto::{hash, Address, Hash, KeyPair, PublicKey, Signature},
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampMicros,
    transaction::Transaction,
};

mod merkle;
mod vrf;

pub use merkle::calculate_merkle_root;
pub use vrf::{VrfData, VrfInfo};

pub type Height = u64;

/// A sealed block.
///
/// `data` is a JSON object mapping transaction hash to its contract storage
/// entry; `"{}"` for blocks without contract transactions.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Block {
    version: u32,
    time: TimestampMicros,
    height: Height,
    prev_hash: Hash,
    merkle_root: Hash,
    hash: Hash,
    txs: Vec<Transaction>,
    data: String,
}

impl Block {
    pub fn new(
        version: u32,
        time: TimestampMicros,
        height: Height,
        prev_hash: Hash,
        txs: Vec<Transaction>,
        data: String,
    ) -> Self {
        let merkle_root = calculate_merkle_root(&txs);
        let mut block = Self {
            version,
            time,
            height,
            prev_hash,
            merkle_root,
            hash: Hash::zero(),
            txs,
            data,
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_time(&self) -> TimestampMicros {
        self.time
    }

    pub fn get_height(&self) -> Height {
        self.height
    }

    pub fn get_prev_hash(&self) -> &Hash {
        &self.prev_hash
    }

    pub fn get_merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    pub fn get_hash(&self) -> &Hash {
        &self.hash
    }

    pub fn get_txs(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn get_data(&self) -> &str {
        &self.data
    }

    // Everything except the hash field itself
    fn write_no_hash(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        writer.write_u64(self.time);
        writer.write_u64(self.height);
        writer.write_hash(&self.prev_hash);
        writer.write_hash(&self.merkle_root);
        self.txs.write(writer);
        writer.write_string(&self.data);
    }

    /// Block hash: blake3 over the serialization with the hash field cleared.
    pub fn compute_hash(&self) -> Hash {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        self.write_no_hash(&mut writer);
        hash(&buffer)
    }

    /// Check the stored hash and merkle root against the content.
    pub fn verify_integrity(&self) -> bool {
        self.hash == self.compute_hash() && self.merkle_root == calculate_merkle_root(&self.txs)
    }
}

impl Serializer for Block {
    fn write(&self, writer: &mut Writer) {
        self.write_no_hash(writer);
        writer.write_hash(&self.hash);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            version: reader.read_u32()?,
            time: reader.read_u64()?,
            height: reader.read_u64()?,
            prev_hash: reader.read_hash()?,
            merkle_root: reader.read_hash()?,
            txs: Vec::read(reader)?,
            data: reader.read_string()?,
            hash: reader.read_hash()?,
        })
    }
}

/// Signed envelope handed to consensus: the serialized block plus the VRF
/// attachments proving how its contract transactions were routed.
#[derive(Clone, Debug)]
pub struct BlockMessage {
    pub version: u32,
    pub time: TimestampMicros,
    pub block: Vec<u8>,
    pub vrf_infos: Vec<VrfInfo>,
    pub tx_vrf_infos: Vec<VrfInfo>,
    pub pubkey: Option<PublicKey>,
    pub signature: Option<Signature>,
}

impl BlockMessage {
    pub fn new(version: u32, time: TimestampMicros, block: Vec<u8>) -> Self {
        Self {
            version,
            time,
            block,
            vrf_infos: Vec::new(),
            tx_vrf_infos: Vec::new(),
            pubkey: None,
            signature: None,
        }
    }

    // The block bytes are excluded from the signed content: the block
    // carries its own hash, and consensus checks that separately.
    fn write_for_signing(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        writer.write_u64(self.time);
        self.vrf_infos.write(writer);
        self.tx_vrf_infos.write(writer);
    }

    pub fn signing_hash(&self) -> Hash {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        self.write_for_signing(&mut writer);
        hash(&buffer)
    }

    pub fn sign(&mut self, keypair: &KeyPair) {
        let digest = self.signing_hash();
        self.pubkey = Some(keypair.public_key());
        self.signature = Some(keypair.sign(digest.as_bytes()));
    }

    pub fn verify_signature(&self) -> bool {
        let (Some(pubkey), Some(signature)) = (&self.pubkey, &self.signature) else {
            return false;
        };
        pubkey
            .verify(self.signing_hash().as_bytes(), signature)
            .is_ok()
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.pubkey.as_ref().map(Address::from_public_key)
    }

    /// Drop the VRF attachments, done when consensus rejects the block.
    pub fn clear_vrf_infos(&mut self) {
        self.vrf_infos.clear();
        self.tx_vrf_infos.clear();
    }
}

impl Serializer for BlockMessage {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        writer.write_u64(self.time);
        writer.write_byte_blob(&self.block);
        self.vrf_infos.write(writer);
        self.tx_vrf_infos.write(writer);
        self.pubkey.write(writer);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            version: reader.read_u32()?,
            time: reader.read_u64()?,
            block: reader.read_byte_blob()?,
            vrf_infos: Vec::read(reader)?,
            tx_vrf_infos: Vec::read(reader)?,
            pubkey: Option::read(reader)?,
            signature: Option::read(reader)?,
        })
    }
}
