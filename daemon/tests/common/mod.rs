// Shared test harness: mock collaborators and node construction.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crest_common::{
    block::{Block, BlockMessage, Height},
    contract::{ContractVm, VmError, VmOutput},
    crypto::{hash, Address, Hash, KeyPair},
    serializer::Serializer,
    time::{get_current_time_in_micros, TimestampMicros},
    transaction::{CallContractPayload, DeployContractPayload, Transaction, TxInput, TxType},
};
use crest_daemon::core::{
    block_builder::{BlockHandler, ConsensusError},
    block_storage::BlockStorage,
    election::PackerElection,
    error::BlockchainError,
    peers::PeerProvider,
    runtime::RuntimeContext,
    storage::Storage,
};
use crest_daemon::p2p::messaging::{MessageSender, ResponseCollector, SendFlags};
use crest_daemon::p2p::packet::{
    ContractPackagerMessage, Packet, SeekBlockEntry, SeekContractPreHashResponse, TxRequest,
};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockStorage {
    pub top: Mutex<Height>,
    pub stake: Mutex<Vec<Address>>,
    pub invested: Mutex<HashSet<Address>>,
    pub blocks: Mutex<HashMap<Hash, Block>>,
    pub tx_blocks: Mutex<HashMap<Hash, Hash>>,
    pub contract_roots: Mutex<HashMap<Address, Hash>>,
}

impl MockStorage {
    pub fn set_top(&self, height: Height) {
        *self.top.lock().unwrap() = height;
    }

    pub fn add_qualified(&self, addr: Address) {
        self.stake.lock().unwrap().push(addr.clone());
        self.invested.lock().unwrap().insert(addr);
    }

    pub fn set_contract_root(&self, addr: Address, root: Hash) {
        self.contract_roots.lock().unwrap().insert(addr, root);
    }

    pub fn put_block(&self, block: Block) {
        let block_hash = block.get_hash().clone();
        for tx in block.get_txs() {
            self.tx_blocks
                .lock()
                .unwrap()
                .insert(tx.hash(), block_hash.clone());
        }
        self.blocks.lock().unwrap().insert(block_hash, block);
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn get_block_top(&self) -> Result<Height, BlockchainError> {
        Ok(*self.top.lock().unwrap())
    }

    async fn get_stake_addresses(&self) -> Result<Vec<Address>, BlockchainError> {
        Ok(self.stake.lock().unwrap().clone())
    }

    async fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, BlockchainError> {
        Ok(self.blocks.lock().unwrap().get(hash).cloned())
    }

    async fn get_block_hash_by_transaction_hash(
        &self,
        tx_hash: &Hash,
    ) -> Result<Option<Hash>, BlockchainError> {
        Ok(self.tx_blocks.lock().unwrap().get(tx_hash).cloned())
    }

    async fn get_latest_utxo_by_contract_addr(
        &self,
        addr: &Address,
    ) -> Result<Option<Hash>, BlockchainError> {
        Ok(self.contract_roots.lock().unwrap().get(addr).cloned())
    }

    async fn is_invested(&self, addr: &Address) -> Result<bool, BlockchainError> {
        Ok(self.invested.lock().unwrap().contains(addr))
    }
}

// ---------------------------------------------------------------------------
// Block storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockBlockStorage {
    pub prev_hashes: Mutex<HashMap<Height, Option<Hash>>>,
    pub unavailable: Mutex<HashSet<Height>>,
    pub hanging: Mutex<HashSet<Height>>,
    held_senders: Mutex<Vec<tokio::sync::oneshot::Sender<Option<Hash>>>>,
    pub seek_tasks: Mutex<Vec<Height>>,
    pub forced_seeks: Mutex<Vec<Height>>,
    pub stored: Mutex<HashSet<Hash>>,
    pub seek_blocks: Mutex<Vec<Block>>,
    pub persist_on_add: AtomicBool,
}

impl MockBlockStorage {
    pub fn set_prev_hash(&self, height: Height, prev: Hash) {
        self.prev_hashes.lock().unwrap().insert(height, Some(prev));
    }

    pub fn set_prev_hash_empty(&self, height: Height) {
        self.prev_hashes.lock().unwrap().insert(height, None);
    }

    pub fn set_hanging(&self, height: Height) {
        self.hanging.lock().unwrap().insert(height);
    }

    pub fn set_unavailable(&self, height: Height) {
        self.unavailable.lock().unwrap().insert(height);
    }

    pub fn mark_stored(&self, block_hash: Hash) {
        self.stored.lock().unwrap().insert(block_hash);
    }
}

#[async_trait]
impl BlockStorage for MockBlockStorage {
    fn prev_hash_receiver(
        &self,
        height: Height,
    ) -> Option<tokio::sync::oneshot::Receiver<Option<Hash>>> {
        if self.unavailable.lock().unwrap().contains(&height) {
            return None;
        }
        let (sender, receiver) = tokio::sync::oneshot::channel();
        if self.hanging.lock().unwrap().contains(&height) {
            // keep the sender alive so the receiver pends forever
            self.held_senders.lock().unwrap().push(sender);
        } else {
            let value = self
                .prev_hashes
                .lock()
                .unwrap()
                .get(&height)
                .cloned()
                .unwrap_or(None);
            let _ = sender.send(value);
        }
        Some(receiver)
    }

    async fn commit_seek_task(&self, height: Height) {
        self.seek_tasks.lock().unwrap().push(height);
    }

    async fn force_commit_seek(&self, height: Height) {
        self.forced_seeks.lock().unwrap().push(height);
    }

    async fn add_seek_block(&self, block: Block) {
        if self.persist_on_add.load(Ordering::SeqCst) {
            self.stored.lock().unwrap().insert(block.get_hash().clone());
        }
        self.seek_blocks.lock().unwrap().push(block);
    }

    async fn is_block_stored(&self, hash: &Hash) -> bool {
        self.stored.lock().unwrap().contains(hash)
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(Address, Packet)>>,
    collector: Mutex<Option<Arc<ResponseCollector>>>,
    pub seek_blocks_by_peer: Mutex<HashMap<Address, Vec<SeekBlockEntry>>>,
    pub auto_ack: AtomicBool,
}

impl RecordingMessenger {
    /// Wire the requester's collector in so fan-out requests get answered
    /// inline, as if every peer replied instantly.
    pub fn attach_collector(&self, collector: Arc<ResponseCollector>) {
        *self.collector.lock().unwrap() = Some(collector);
        self.auto_ack.store(true, Ordering::SeqCst);
    }

    pub fn set_peer_seek_blocks(&self, peer: Address, blocks: Vec<SeekBlockEntry>) {
        self.seek_blocks_by_peer.lock().unwrap().insert(peer, blocks);
    }

    pub fn sent_packets(&self) -> Vec<(Address, Packet)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingMessenger {
    async fn send(
        &self,
        peer: &Address,
        packet: Packet,
        _flags: SendFlags,
    ) -> Result<(), BlockchainError> {
        if self.auto_ack.load(Ordering::SeqCst) {
            if let Packet::SeekContractPreHashRequest(request) = &packet {
                if let Some(collector) = self.collector.lock().unwrap().as_ref() {
                    let blocks = self
                        .seek_blocks_by_peer
                        .lock()
                        .unwrap()
                        .get(peer)
                        .cloned()
                        .unwrap_or_default();
                    let ack = SeekContractPreHashResponse {
                        msg_id: request.msg_id.clone(),
                        origin: peer.clone(),
                        blocks,
                    };
                    collector.add_response(&request.msg_id, ack.to_bytes());
                }
            }
        }
        self.sent.lock().unwrap().push((peer.clone(), packet));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VM
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockVm {
    outputs: Mutex<HashMap<String, Result<VmOutput, VmError>>>,
    pub executed: Mutex<Vec<String>>,
}

impl MockVm {
    /// Program the result for a call input or deploy code string.
    pub fn program(&self, key: &str, result: Result<VmOutput, VmError>) {
        self.outputs.lock().unwrap().insert(key.to_string(), result);
    }

    pub fn execution_order(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn run(&self, key: &str, fallback_touched: Vec<Address>) -> Result<VmOutput, VmError> {
        self.executed.lock().unwrap().push(key.to_string());
        match self.outputs.lock().unwrap().get(key) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(e)) => Err(VmError::Execution {
                code: e.code(),
                message: e.to_string(),
            }),
            None => Ok(VmOutput {
                touched: fallback_touched,
                ..VmOutput::default()
            }),
        }
    }
}

#[async_trait]
impl ContractVm for MockVm {
    async fn deploy(
        &self,
        _from: &Address,
        _owner_evm_addr: &str,
        code: &str,
        transient_address: &Address,
    ) -> Result<VmOutput, VmError> {
        self.run(code, vec![transient_address.clone()])
    }

    async fn call(
        &self,
        _from: &Address,
        _owner_evm_addr: &str,
        _deployer_addr: &Address,
        _deploy_hash: &Hash,
        input: &str,
        _transfer_amount: u64,
    ) -> Result<VmOutput, VmError> {
        self.run(input, Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Peers, election, consensus
// ---------------------------------------------------------------------------

pub struct StaticPeers {
    pub peers: Vec<Address>,
}

#[async_trait]
impl PeerProvider for StaticPeers {
    async fn qualified_peers(&self, _height: Height) -> Result<Vec<Address>, BlockchainError> {
        Ok(self.peers.clone())
    }
}

/// Election that always elects one fixed packager, regardless of the
/// random number. Lets tests route work at a chosen node while the VRF
/// proofs stay real.
pub struct FixedElection {
    pub packer: Address,
}

impl PackerElection for FixedElection {
    fn packer_from_random(&self, _rand: f64, candidates: &[Address]) -> Option<Address> {
        if candidates.is_empty() {
            return None;
        }
        Some(self.packer.clone())
    }

    fn packer_by_time(
        &self,
        _time: TimestampMicros,
        _height: Height,
        candidates: &[Address],
    ) -> Option<Address> {
        if candidates.is_empty() {
            return None;
        }
        Some(self.packer.clone())
    }
}

#[derive(Default)]
pub struct RecordingConsensus {
    pub received: Mutex<Vec<BlockMessage>>,
    pub fail_code: Mutex<Option<i32>>,
}

impl RecordingConsensus {
    pub fn received_blocks(&self) -> Vec<Block> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|msg| Block::from_bytes(&msg.block).expect("valid block bytes"))
            .collect()
    }
}

#[async_trait]
impl BlockHandler for RecordingConsensus {
    async fn handle_block(&self, msg: &BlockMessage) -> Result<(), ConsensusError> {
        if let Some(code) = *self.fail_code.lock().unwrap() {
            return Err(ConsensusError { code });
        }
        self.received.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Node harness
// ---------------------------------------------------------------------------

pub struct TestNode {
    pub ctx: Arc<RuntimeContext<MockStorage>>,
    pub storage: Arc<MockStorage>,
    pub block_storage: Arc<MockBlockStorage>,
    pub messenger: Arc<RecordingMessenger>,
    pub vm: Arc<MockVm>,
    pub consensus: Arc<RecordingConsensus>,
    pub address: Address,
}

/// Build a node from an explicit keypair, qualified set and elected
/// packager address.
pub fn make_node_with(keypair: KeyPair, peer_set: Vec<Address>, packer: Address) -> TestNode {
    let _ = env_logger::builder().is_test(true).try_init();
    let address = Address::from_public_key(&keypair.public_key());

    let storage = Arc::new(MockStorage::default());
    let block_storage = Arc::new(MockBlockStorage::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let vm = Arc::new(MockVm::default());
    let consensus = Arc::new(RecordingConsensus::default());

    let ctx = RuntimeContext::new(
        storage.clone(),
        block_storage.clone(),
        messenger.clone(),
        vm.clone(),
        Arc::new(StaticPeers { peers: peer_set }),
        Arc::new(FixedElection { packer }),
        consensus.clone(),
        keypair,
    );
    messenger.attach_collector(ctx.responses.clone());

    TestNode {
        ctx,
        storage,
        block_storage,
        messenger,
        vm,
        consensus,
        address,
    }
}

/// Build a node that is its own elected packager, with `peer_set` as the
/// qualified set (the node's own address is appended).
pub fn make_node(mut peer_set: Vec<Address>) -> TestNode {
    let keypair = KeyPair::generate();
    let address = Address::from_public_key(&keypair.public_key());
    peer_set.push(address.clone());
    make_node_with(keypair, peer_set, address)
}

// ---------------------------------------------------------------------------
// Transaction builders
// ---------------------------------------------------------------------------

pub struct Submitter {
    pub keypair: KeyPair,
    pub identity: Address,
}

impl Submitter {
    pub fn new() -> Self {
        let keypair = KeyPair::generate();
        let identity = Address::from_public_key(&keypair.public_key());
        Self { keypair, identity }
    }

    pub fn evm_hex(&self) -> String {
        self.identity.to_evm_hex()
    }
}

pub fn contract_addr(seed: &[u8]) -> Address {
    let digest = hash(seed);
    Address::from_evm_hex(&hex::encode(&digest.as_bytes()[..20])).unwrap()
}

pub fn transfer_tx(input_seed: &[u8]) -> Transaction {
    let submitter = Submitter::new();
    let mut tx = Transaction::new(
        1,
        TxType::Transfer,
        submitter.identity.clone(),
        get_current_time_in_micros(),
        vec![TxInput {
            utxo: hash(input_seed),
            index: 0,
        }],
        "{}".to_string(),
    );
    tx.sign(&submitter.keypair);
    tx
}

/// A call transaction left unsigned; stage-1 revalidation rejects it.
pub fn call_tx_unsigned(submitter: &Submitter, input: &str) -> Transaction {
    let payload = CallContractPayload {
        owner_evm_addr: submitter.evm_hex(),
        vm_type: crest_common::contract::VmType::Evm,
        deployer_addr: submitter.identity.clone(),
        deploy_hash: hash(b"deployed-contract"),
        input: input.to_string(),
        transfer_amount: 0,
    };
    Transaction::new(
        1,
        TxType::CallContract,
        submitter.identity.clone(),
        get_current_time_in_micros(),
        vec![TxInput {
            utxo: hash(input.as_bytes()),
            index: 0,
        }],
        serde_json::to_string(&payload).unwrap(),
    )
}

pub fn call_tx(submitter: &Submitter, input: &str) -> Transaction {
    let mut tx = call_tx_unsigned(submitter, input);
    tx.sign(&submitter.keypair);
    tx
}

pub fn deploy_tx(submitter: &Submitter, code: &str, transient: &Address) -> Transaction {
    let payload = DeployContractPayload {
        owner_evm_addr: submitter.evm_hex(),
        vm_type: crest_common::contract::VmType::Evm,
        code: code.to_string(),
        transient_address: transient.clone(),
    };
    let mut tx = Transaction::new(
        1,
        TxType::DeployContract,
        submitter.identity.clone(),
        get_current_time_in_micros(),
        vec![TxInput {
            utxo: hash(code.as_bytes()),
            index: 0,
        }],
        serde_json::to_string(&payload).unwrap(),
    );
    tx.sign(&submitter.keypair);
    tx
}

pub fn tx_request(tx: Transaction, height: Height, dirty: Vec<Address>) -> TxRequest {
    TxRequest {
        tx,
        height,
        dirty_contracts: dirty,
    }
}

/// Assemble a signed packager message the way a dispatcher does: VRF over
/// the sorted member hashes, proved with the dispatcher key.
pub fn packager_message(
    dispatcher: &KeyPair,
    requests: Vec<TxRequest>,
    node_list: Vec<Address>,
    height: Height,
) -> ContractPackagerMessage {
    use crest_common::block::{VrfData, VrfInfo};
    use crest_common::crypto::vrf;
    use crest_daemon::core::dispatcher::cluster_vrf_input;

    let hashes: Vec<Hash> = requests.iter().map(|r| r.tx.hash()).collect();
    let input = cluster_vrf_input(&hashes);
    let (output, proof) = vrf::prove(dispatcher, &input);
    let vrf_info = VrfInfo {
        data: VrfData {
            output,
            height,
            tx_hash: None,
        },
        pubkey: dispatcher.public_key(),
        proof,
    };
    let mut msg = ContractPackagerMessage::new(1, requests, vrf_info, node_list);
    msg.sign(dispatcher);
    msg
}

/// Poll until `predicate` holds or the timeout passes.
pub async fn wait_until<F: Fn() -> bool>(predicate: F, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    predicate()
}
