// Block assembly and the consensus handoff.
//
// `create_block` seals the transaction set into a block: storage blob,
// previous hash (awaited with a bound), merkle root, hash. `build_block`
// wraps it into the signed consensus envelope with the VRF attachments and
// hands it to the consensus collaborator.

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::Map;
use thiserror::Error;
use tokio::time::{timeout, Duration};

use crest_common::{
    block::{Block, BlockMessage, Height},
    config::{CURRENT_BLOCK_VERSION, NETWORK_VERSION},
    crypto::Hash,
    serializer::Serializer,
    time::{get_current_time_in_micros, MICROS_PER_SECOND},
    transaction::Transaction,
};

use crate::config::{PREV_HASH_WAIT_SECS, TX_EXPIRE_INTERVAL_SECS};
use crate::core::{
    election::{vrf_agent_type, VrfAgentType},
    error::{BlockBuildError, CreateBlockError},
    runtime::RuntimeContext,
    storage::Storage,
};

/// Consensus collaborator: receives the finished block message and runs
/// the voting round on it.
#[async_trait]
pub trait BlockHandler: Send + Sync + 'static {
    async fn handle_block(&self, msg: &BlockMessage) -> Result<(), ConsensusError>;
}

#[derive(Debug, Error)]
#[error("consensus returned code {code}")]
pub struct ConsensusError {
    pub code: i32,
}

/// Seal `txs` into a block at `height`.
pub async fn create_block<S: Storage>(
    ctx: &RuntimeContext<S>,
    txs: &[Transaction],
    height: Height,
) -> Result<Block, CreateBlockError> {
    let time = get_current_time_in_micros();

    // contract transactions contribute their staged storage entry plus the
    // submitter's dirty declaration; either one missing kills the build
    let mut storage_blob = Map::new();
    for tx in txs {
        if !tx.is_contract() {
            continue;
        }
        let tx_hash = tx.hash();
        let Some(mut entry) = ctx.contract_info.get(&tx_hash) else {
            error!("no staged storage for contract transaction {}", tx_hash);
            return Err(CreateBlockError::MissingStorageEntry(tx_hash));
        };
        let Some(dirty) = ctx.dirty_contracts.get(&tx_hash) else {
            error!("no dirty declaration for contract transaction {}", tx_hash);
            return Err(CreateBlockError::MissingStorageEntry(tx_hash));
        };
        entry.dependent_contracts = dirty;
        let value = serde_json::to_value(&entry).expect("storage entry serializes");
        storage_blob.insert(tx_hash.to_hex(), value);
    }
    let data =
        serde_json::to_string(&storage_blob).expect("storage blob serializes");

    let prev_height = height - 1;
    let Some(receiver) = ctx.block_storage.prev_hash_receiver(prev_height) else {
        error!("no previous-hash future for height {}", prev_height);
        return Err(CreateBlockError::PrevHashUnavailable(prev_height));
    };
    let prev_hash = match timeout(Duration::from_secs(PREV_HASH_WAIT_SECS), receiver).await {
        Err(_) => {
            error!("previous-hash wait timed out for height {}", prev_height);
            return Err(CreateBlockError::PrevHashTimeout(prev_height));
        }
        Ok(Err(_)) | Ok(Ok(None)) => {
            error!("previous-hash future resolved empty for height {}", prev_height);
            return Err(CreateBlockError::PrevHashEmpty(prev_height));
        }
        Ok(Ok(Some(hash))) => hash,
    };

    let block = Block::new(
        CURRENT_BLOCK_VERSION,
        time,
        height,
        prev_hash,
        txs.to_vec(),
        data,
    );
    if log::log_enabled!(log::Level::Debug) {
        debug!(
            "created block {} at height {} with {} transactions",
            block.get_hash(),
            height,
            txs.len()
        );
    }
    Ok(block)
}

/// Build, sign and hand off a block. Returns the block hash on success.
pub async fn build_block<S: Storage>(
    ctx: &RuntimeContext<S>,
    txs: Vec<Transaction>,
    height: Height,
) -> Result<Hash, BlockBuildError> {
    if txs.is_empty() {
        return Err(BlockBuildError::EmptyInput);
    }

    let now = get_current_time_in_micros();
    for tx in &txs {
        if now.saturating_sub(tx.get_time()) > TX_EXPIRE_INTERVAL_SECS * MICROS_PER_SECOND {
            warn!(
                "including stale transaction {} ({} s old)",
                tx.hash(),
                now.saturating_sub(tx.get_time()) / MICROS_PER_SECOND
            );
        }
    }

    let block = match create_block(ctx, &txs, height).await {
        Ok(block) => block,
        Err(e) => {
            if e.triggers_seek() {
                ctx.block_storage.force_commit_seek(height - 1).await;
            }
            return Err(BlockBuildError::Create(e));
        }
    };

    let mut msg = BlockMessage::new(NETWORK_VERSION, get_current_time_in_micros(), block.to_bytes());

    // attach VRF proofs for transactions routed through an elected
    // packager; locally handled ones carry none
    let handled_height = height - 1;
    let candidates = ctx
        .peers
        .qualified_peers(handled_height)
        .await
        .unwrap_or_default();
    for tx in block.get_txs() {
        let agent_type = vrf_agent_type(&*ctx.election, &candidates, tx, handled_height);
        if matches!(agent_type, VrfAgentType::Default | VrfAgentType::Local) {
            continue;
        }
        let tx_hash = tx.hash();
        let Some(vrf_info) = ctx.vrf_registry.block_vrf(&tx_hash) else {
            error!("no VRF attachment for transaction {}", tx_hash);
            return Err(BlockBuildError::VrfAttachmentMissing(tx_hash));
        };
        msg.vrf_infos.push(vrf_info);

        let Some(mut tx_vrf) = ctx.vrf_registry.tx_vrf(&tx_hash) else {
            error!("no per-transaction VRF attachment for {}", tx_hash);
            return Err(BlockBuildError::TxVrfAttachmentMissing(tx_hash));
        };
        tx_vrf.data.tx_hash = Some(tx_hash);
        msg.tx_vrf_infos.push(tx_vrf);
    }

    msg.sign(&ctx.keypair);
    if msg.signature.is_none() {
        return Err(BlockBuildError::SignFailure);
    }

    if let Err(e) = ctx.consensus.handle_block(&msg).await {
        error!(
            "consensus rejected block {} with code {}",
            block.get_hash(),
            e.code
        );
        msg.clear_vrf_infos();
        return Err(BlockBuildError::Consensus { code: e.code });
    }

    Ok(block.get_hash().clone())
}
