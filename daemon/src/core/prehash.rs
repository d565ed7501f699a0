// Contract pre-hash reconciliation.
//
// Before a contract block seals, every declared `contract -> previous
// root` edge must match this node's on-disk view, and a quorum of staked
// peers is asked for theirs. A peer that disagrees replies with the block
// its own root lives in; a block reported by enough peers is pulled
// through the seek pipeline and must persist before the round continues.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use log::{debug, warn};

use crest_common::{
    block::Block,
    config::NETWORK_VERSION,
    crypto::{Address, Hash},
    serializer::Serializer,
    transaction::{Transaction, TxType},
};

use crate::config::{
    PREHASH_ACCEPT_DEN, PREHASH_ACCEPT_NUM, PREHASH_FALLBACK_DEN, PREHASH_FALLBACK_NUM,
    PREHASH_QUORUM_DEN, PREHASH_QUORUM_NUM, PREHASH_WAIT_SECS, SEEK_BLOCK_POLL_LIMIT_SECS,
    SEEK_BLOCK_POLL_SECS,
};
use crate::core::{error::BlockchainError, runtime::RuntimeContext, storage::Storage};
use crate::p2p::messaging::SendFlags;
use crate::p2p::packet::{
    Packet, RootHashEdge, SeekBlockEntry, SeekContractPreHashRequest, SeekContractPreHashResponse,
};

/// Extract the previous-root edges a contract block depends on.
///
/// Deploys are skipped (they create their roots), and so is any edge whose
/// previous root is itself a transaction in this batch: those are in-block
/// chain links, not references to committed state. Every surviving edge is
/// asserted against the local store before it is returned.
pub async fn collect_prev_hash_edges<S: Storage>(
    ctx: &RuntimeContext<S>,
    txs: &[Transaction],
) -> Result<Vec<RootHashEdge>, BlockchainError> {
    let mut per_tx: BTreeMap<Hash, Vec<(Address, Hash)>> = BTreeMap::new();
    for tx in txs {
        if !tx.is_contract() || tx.get_tx_type() == TxType::DeployContract {
            continue;
        }
        let tx_hash = tx.hash();
        let entry = ctx
            .contract_info
            .get(&tx_hash)
            .ok_or_else(|| BlockchainError::MissingStorageEntry(tx_hash.clone()))?;
        per_tx.insert(
            tx_hash,
            entry
                .prev_hashes
                .into_iter()
                .collect(),
        );
    }

    let batch: HashSet<&Hash> = per_tx.keys().collect();
    let mut seen: HashSet<RootHashEdge> = HashSet::new();
    let mut edges = Vec::new();
    for edge_list in per_tx.values() {
        for (addr, declared_root) in edge_list {
            if batch.contains(declared_root) {
                continue;
            }
            let stored = ctx
                .storage
                .get_latest_utxo_by_contract_addr(addr)
                .await?
                .ok_or_else(|| BlockchainError::PrevRootLookupMiss(addr.clone()))?;
            if stored != *declared_root {
                return Err(BlockchainError::PrevRootMismatch {
                    addr: addr.clone(),
                    declared: declared_root.clone(),
                    stored,
                });
            }
            let edge = RootHashEdge {
                contract_addr: addr.clone(),
                root_hash: declared_root.clone(),
            };
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
    }
    Ok(edges)
}

/// Confirm the edge list with the staked peer set and absorb any divergent
/// block the network agrees on.
pub async fn seek_prehash_quorum<S: Storage>(
    ctx: &RuntimeContext<S>,
    edges: &[RootHashEdge],
) -> Result<(), BlockchainError> {
    let top = ctx.storage.get_block_top().await?;
    let peers: Vec<Address> = ctx
        .peers
        .qualified_peers(top)
        .await?
        .into_iter()
        .filter(|peer| peer != ctx.self_address())
        .collect();
    if peers.is_empty() {
        debug!("no peers to confirm pre-hashes with");
        return Ok(());
    }

    let required = (peers.len() * PREHASH_QUORUM_NUM).div_ceil(PREHASH_QUORUM_DEN);
    let msg_id = ctx.responses.create_wait(required);
    let request = SeekContractPreHashRequest {
        version: NETWORK_VERSION,
        msg_id: msg_id.clone(),
        origin: ctx.self_address().clone(),
        edges: edges.to_vec(),
    };
    for peer in &peers {
        ctx.messenger
            .send(
                peer,
                Packet::SeekContractPreHashRequest(request.clone()),
                SendFlags::high_priority(),
            )
            .await?;
    }

    let replies = ctx
        .responses
        .wait_data(&msg_id, Duration::from_secs(PREHASH_WAIT_SECS))
        .await;
    if replies.len() * PREHASH_FALLBACK_DEN < peers.len() * PREHASH_FALLBACK_NUM {
        return Err(BlockchainError::QuorumInsufficient {
            asked: peers.len(),
            heard: replies.len(),
        });
    }

    // group the returned raw blocks, counting distinct reporting nodes
    let mut reporters_by_block: HashMap<Vec<u8>, HashSet<Address>> = HashMap::new();
    let mut responders = 0usize;
    for raw in &replies {
        let Ok(ack) = SeekContractPreHashResponse::from_bytes(raw) else {
            continue;
        };
        responders += 1;
        for entry in ack.blocks {
            reporters_by_block
                .entry(entry.block_raw)
                .or_default()
                .insert(ack.origin.clone());
        }
    }
    if responders == 0 {
        return Err(BlockchainError::QuorumInsufficient {
            asked: peers.len(),
            heard: 0,
        });
    }

    for (raw, reporters) in reporters_by_block {
        if reporters.len() * PREHASH_ACCEPT_DEN < responders * PREHASH_ACCEPT_NUM {
            continue;
        }
        let Ok(block) = Block::from_bytes(&raw) else {
            warn!("quorum-accepted block bytes failed to decode, skipping");
            continue;
        };
        if !block.verify_integrity() {
            warn!("quorum-accepted block {} fails integrity, skipping", block.get_hash());
            continue;
        }
        absorb_divergent_block(ctx, block).await?;
    }
    Ok(())
}

// Submit a divergent block for persistence and poll until it lands.
async fn absorb_divergent_block<S: Storage>(
    ctx: &RuntimeContext<S>,
    block: Block,
) -> Result<(), BlockchainError> {
    let block_hash = block.get_hash().clone();
    if ctx.block_storage.is_block_stored(&block_hash).await {
        return Ok(());
    }
    debug!("absorbing divergent block {}", block_hash);
    ctx.block_storage.add_seek_block(block).await;

    let attempts = SEEK_BLOCK_POLL_LIMIT_SECS / SEEK_BLOCK_POLL_SECS;
    for attempt in 0..=attempts {
        if ctx.block_storage.is_block_stored(&block_hash).await {
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(Duration::from_secs(SEEK_BLOCK_POLL_SECS)).await;
        }
    }
    Err(BlockchainError::SeekBlockNotPersisted(block_hash))
}

/// Responder side: compare each requested edge with the local store and
/// return the blocks behind any divergent root. An agreeing peer replies
/// with an empty list, which still counts toward the requester's quorum.
pub async fn handle_seek_prehash_request<S: Storage>(
    ctx: &RuntimeContext<S>,
    request: SeekContractPreHashRequest,
) -> Result<(), BlockchainError> {
    let mut blocks = Vec::new();
    for edge in &request.edges {
        let Some(stored_root) = ctx
            .storage
            .get_latest_utxo_by_contract_addr(&edge.contract_addr)
            .await?
        else {
            continue;
        };
        if stored_root == edge.root_hash {
            continue;
        }
        let Some(block_hash) = ctx
            .storage
            .get_block_hash_by_transaction_hash(&stored_root)
            .await?
        else {
            continue;
        };
        let Some(block) = ctx.storage.get_block_by_hash(&block_hash).await? else {
            continue;
        };
        blocks.push(SeekBlockEntry {
            contract_addr: edge.contract_addr.clone(),
            root_hash: stored_root,
            block_raw: block.to_bytes(),
        });
    }

    let ack = SeekContractPreHashResponse {
        msg_id: request.msg_id.clone(),
        origin: ctx.self_address().clone(),
        blocks,
    };
    ctx.messenger
        .send(
            &request.origin,
            Packet::SeekContractPreHashResponse(ack),
            SendFlags::high_priority_compressed(),
        )
        .await
}
