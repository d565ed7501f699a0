// Typed packets exchanged by the contract pipeline.

use crest_common::{
    block::{Height, VrfInfo},
    crypto::{hash, Address, Hash, KeyPair, PublicKey, Signature},
    serializer::{Reader, ReaderError, Serializer, Writer},
    transaction::Transaction,
};

/// A verified inbound transaction request: the transaction, the height the
/// submitter saw, and its dirty-contract declaration.
#[derive(Clone, Debug)]
pub struct TxRequest {
    pub tx: Transaction,
    pub height: Height,
    pub dirty_contracts: Vec<Address>,
}

impl Serializer for TxRequest {
    fn write(&self, writer: &mut Writer) {
        self.tx.write(writer);
        writer.write_u64(self.height);
        self.dirty_contracts.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            tx: Transaction::read(reader)?,
            height: reader.read_u64()?,
            dirty_contracts: Vec::read(reader)?,
        })
    }
}

/// A dispatcher handing a dependency cluster to its elected packager.
#[derive(Clone, Debug)]
pub struct ContractPackagerMessage {
    pub version: u32,
    pub tx_requests: Vec<TxRequest>,
    /// Proof of the election that chose the receiver
    pub vrf: VrfInfo,
    /// Snapshot of the staked+invested set the election drew from
    pub vrf_node_list: Vec<Address>,
    pub pubkey: Option<PublicKey>,
    pub signature: Option<Signature>,
}

impl ContractPackagerMessage {
    pub fn new(
        version: u32,
        tx_requests: Vec<TxRequest>,
        vrf: VrfInfo,
        vrf_node_list: Vec<Address>,
    ) -> Self {
        Self {
            version,
            tx_requests,
            vrf,
            vrf_node_list,
            pubkey: None,
            signature: None,
        }
    }

    fn write_no_signature(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        self.tx_requests.write(writer);
        self.vrf.write(writer);
        self.vrf_node_list.write(writer);
    }

    /// Hash of the message with the signature fields cleared.
    pub fn signing_hash(&self) -> Hash {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        self.write_no_signature(&mut writer);
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
}

impl Serializer for ContractPackagerMessage {
    fn write(&self, writer: &mut Writer) {
        self.write_no_signature(writer);
        self.pubkey.write(writer);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            version: reader.read_u32()?,
            tx_requests: Vec::read(reader)?,
            vrf: VrfInfo::read(reader)?,
            vrf_node_list: Vec::read(reader)?,
            pubkey: Option::read(reader)?,
            signature: Option::read(reader)?,
        })
    }
}

/// One `contract address -> previous root` edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootHashEdge {
    pub contract_addr: Address,
    pub root_hash: Hash,
}

impl Serializer for RootHashEdge {
    fn write(&self, writer: &mut Writer) {
        self.contract_addr.write(writer);
        writer.write_hash(&self.root_hash);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            contract_addr: Address::read(reader)?,
            root_hash: reader.read_hash()?,
        })
    }
}

/// Multi-contract pre-hash reconciliation request sent to staked peers
/// before sealing a contract block.
#[derive(Clone, Debug)]
pub struct SeekContractPreHashRequest {
    pub version: u32,
    pub msg_id: String,
    pub origin: Address,
    pub edges: Vec<RootHashEdge>,
}

impl Serializer for SeekContractPreHashRequest {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        writer.write_string(&self.msg_id);
        self.origin.write(writer);
        self.edges.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            version: reader.read_u32()?,
            msg_id: reader.read_string()?,
            origin: Address::read(reader)?,
            edges: Vec::read(reader)?,
        })
    }
}

/// One divergent edge in a reply: the responder's own root for the address
/// plus the raw block that root lives in.
#[derive(Clone, Debug)]
pub struct SeekBlockEntry {
    pub contract_addr: Address,
    pub root_hash: Hash,
    pub block_raw: Vec<u8>,
}

impl Serializer for SeekBlockEntry {
    fn write(&self, writer: &mut Writer) {
        self.contract_addr.write(writer);
        writer.write_hash(&self.root_hash);
        writer.write_byte_blob(&self.block_raw);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            contract_addr: Address::read(reader)?,
            root_hash: reader.read_hash()?,
            block_raw: reader.read_byte_blob()?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct SeekContractPreHashResponse {
    pub msg_id: String,
    pub origin: Address,
    pub blocks: Vec<SeekBlockEntry>,
}

impl Serializer for SeekContractPreHashResponse {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.msg_id);
        self.origin.write(writer);
        self.blocks.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            msg_id: reader.read_string()?,
            origin: Address::read(reader)?,
            blocks: Vec::read(reader)?,
        })
    }
}

const PACKET_CONTRACT_PACKAGER: u8 = 0;
const PACKET_SEEK_PREHASH_REQ: u8 = 1;
const PACKET_SEEK_PREHASH_ACK: u8 = 2;

#[derive(Clone, Debug)]
pub enum Packet {
    ContractPackager(ContractPackagerMessage),
    SeekContractPreHashRequest(SeekContractPreHashRequest),
    SeekContractPreHashResponse(SeekContractPreHashResponse),
}

impl Serializer for Packet {
    fn write(&self, writer: &mut Writer) {
        match self {
            Packet::ContractPackager(msg) => {
                writer.write_u8(PACKET_CONTRACT_PACKAGER);
                msg.write(writer);
            }
            Packet::SeekContractPreHashRequest(req) => {
                writer.write_u8(PACKET_SEEK_PREHASH_REQ);
                req.write(writer);
            }
            Packet::SeekContractPreHashResponse(ack) => {
                writer.write_u8(PACKET_SEEK_PREHASH_ACK);
                ack.write(writer);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            PACKET_CONTRACT_PACKAGER => Ok(Packet::ContractPackager(
                ContractPackagerMessage::read(reader)?,
            )),
            PACKET_SEEK_PREHASH_REQ => Ok(Packet::SeekContractPreHashRequest(
                SeekContractPreHashRequest::read(reader)?,
            )),
            PACKET_SEEK_PREHASH_ACK => Ok(Packet::SeekContractPreHashResponse(
                SeekContractPreHashResponse::read(reader)?,
            )),
            _ => Err(ReaderError::InvalidValue),
        }
    }
}
