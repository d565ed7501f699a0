// Packager-side handling of a dispatched cluster.
//
// A `ContractPackagerMessage` goes through four verifications (message
// signature, VRF proof, peer-set snapshot, election result), then two
// execution stages: stage 1 re-runs full transaction validation
// concurrently, stage 2 executes the dependency clusters. Dependent
// clusters and independent singletons run on separate bounded pools so a
// slow cluster cannot starve the singletons. A stage-1 failure removes the
// transaction and reschedules its cluster; a stage-2 failure evicts the
// whole cluster. Whatever survives is sealed by `process_contract`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use crest_common::{
    config::MAX_TXS_PER_PACKAGER_MSG,
    crypto::{Address, Hash},
    time::get_current_time_in_micros,
    transaction::Transaction,
};

use crate::core::{
    block_builder,
    dispatcher::cluster_vrf_input,
    election::has_packing_permission,
    error::BlockchainError,
    executor,
    pack_dispatch::PackDispatch,
    prehash,
    runtime::RuntimeContext,
    storage::Storage,
    validation::do_handle_tx,
};
use crate::p2p::packet::{ContractPackagerMessage, TxRequest};

type GroupResult = Result<(), (Hash, BlockchainError)>;

pub async fn handle_contract_packager_msg<S: Storage>(
    ctx: &Arc<RuntimeContext<S>>,
    msg: ContractPackagerMessage,
    sender: Address,
) -> Result<(), BlockchainError> {
    // only one packager round runs at a time on a node
    let _guard = ctx.packager_lock.lock().await;

    if msg.tx_requests.is_empty() {
        return Err(BlockchainError::EmptyPackagerMessage);
    }
    if msg.tx_requests.len() > MAX_TXS_PER_PACKAGER_MSG {
        return Err(BlockchainError::OversizedPackagerMessage(
            msg.tx_requests.len(),
        ));
    }

    // 1. message signature
    if !msg.verify_signature() {
        return Err(BlockchainError::InvalidPackagerSignature);
    }

    // 2. VRF proof over the reconstructed cluster input
    let tx_hashes: Vec<Hash> = msg.tx_requests.iter().map(|r| r.tx.hash()).collect();
    let input = cluster_vrf_input(&tx_hashes);
    msg.vrf
        .verify(&input)
        .map_err(BlockchainError::InvalidVrfProof)?;

    // 3. the embedded node list must be the qualified set at the declared
    //    height
    let expected = ctx.peers.qualified_peers(msg.vrf.data.height).await?;
    let embedded: HashSet<&Address> = msg.vrf_node_list.iter().collect();
    let expected_set: HashSet<&Address> = expected.iter().collect();
    if embedded != expected_set {
        return Err(BlockchainError::VrfSourceMismatch {
            height: msg.vrf.data.height,
        });
    }

    // 4. the VRF output must elect this node, and the dispatcher must be a
    //    member of the snapshot it elected from
    let rand = msg.vrf.data.output.to_unit_interval();
    let elected = ctx
        .election
        .packer_from_random(rand, &msg.vrf_node_list)
        .ok_or(BlockchainError::NoQualifiedPeers)?;
    if elected != *ctx.self_address() {
        return Err(BlockchainError::NotElectedPackager { elected });
    }
    if !msg.vrf_node_list.contains(&sender) {
        return Err(BlockchainError::DispatcherNotQualified(sender));
    }

    // 5. register dirty declarations and the proofs the block builder will
    //    attach later
    for request in &msg.tx_requests {
        let tx_hash = request.tx.hash();
        ctx.dirty_contracts
            .register(tx_hash.clone(), request.dirty_contracts.iter().cloned());
        ctx.vrf_registry
            .record_block_vrf(tx_hash.clone(), msg.vrf.clone());
        let mut tx_vrf = msg.vrf.clone();
        tx_vrf.data.tx_hash = Some(tx_hash.clone());
        ctx.vrf_registry.record_tx_vrf(tx_hash, tx_vrf);
    }

    // 6. stage-1: full revalidation, one task per transaction
    let mut stage1 = JoinSet::new();
    for request in msg.tx_requests.clone() {
        let task_ctx = ctx.clone();
        stage1.spawn(async move {
            let tx_hash = request.tx.hash();
            let result = run_stage1(&task_ctx, &request).await;
            (tx_hash, result)
        });
    }

    // 7. partition into dependency clusters
    let mut pack = PackDispatch::new();
    for request in &msg.tx_requests {
        pack.add(
            request.tx.hash(),
            request.dirty_contracts.clone(),
            request.tx.clone(),
        );
    }
    let groups = pack.into_groups();
    let mut dependent = groups.dependent;
    let mut independent = groups.independent;

    // 8. stage-2: clusters and singletons on separate bounded pools
    let cluster_permits = Arc::new(Semaphore::new(num_cpus::get().max(1)));
    let single_permits = Arc::new(Semaphore::new(num_cpus::get().max(1)));

    let mut cluster_tasks: HashMap<u32, JoinHandle<(u32, GroupResult)>> = HashMap::new();
    for (&id, group) in &dependent {
        cluster_tasks.insert(
            id,
            spawn_cluster(ctx.clone(), id, group.clone(), cluster_permits.clone()),
        );
    }
    let mut single_tasks: HashMap<Hash, JoinHandle<(Hash, GroupResult)>> = HashMap::new();
    for (tx_hash, tx) in &independent {
        single_tasks.insert(
            tx_hash.clone(),
            spawn_single(
                ctx.clone(),
                tx_hash.clone(),
                tx.clone(),
                single_permits.clone(),
            ),
        );
    }

    // 9. join stage-1 and prune failures
    let mut stage1_failures: Vec<Hash> = Vec::new();
    while let Some(joined) = stage1.join_next().await {
        match joined {
            Ok((tx_hash, Ok(()))) => {
                if log::log_enabled!(log::Level::Debug) {
                    debug!("stage-1 accepted {}", tx_hash);
                }
            }
            Ok((tx_hash, Err(e))) => {
                warn!("stage-1 rejected {}: {}", tx_hash, e);
                stage1_failures.push(tx_hash);
            }
            Err(e) => {
                error!("stage-1 task failed to join: {}", e);
            }
        }
    }

    let mut rescheduled: HashSet<u32> = HashSet::new();
    for tx_hash in &stage1_failures {
        let mut emptied: Vec<u32> = Vec::new();
        for (&id, group) in dependent.iter_mut() {
            if group.remove(tx_hash).is_some() {
                // every member of the touched cluster re-executes, so drop
                // anything they already staged
                ctx.contract_info
                    .remove_all(group.keys().chain(std::iter::once(tx_hash)));
                if group.is_empty() {
                    emptied.push(id);
                } else {
                    rescheduled.insert(id);
                }
            }
        }
        for id in emptied {
            dependent.remove(&id);
            rescheduled.remove(&id);
            if let Some(handle) = cluster_tasks.remove(&id) {
                handle.abort();
            }
        }
        if independent.remove(tx_hash).is_some() {
            ctx.contract_info.remove_all(std::iter::once(tx_hash));
            if let Some(handle) = single_tasks.remove(tx_hash) {
                handle.abort();
            }
        }
    }

    // clusters that lost members restart with the survivors
    for id in rescheduled {
        if let Some(handle) = cluster_tasks.remove(&id) {
            handle.abort();
        }
        if let Some(group) = dependent.get(&id) {
            debug!("rescheduling cluster {} with {} member(s)", id, group.len());
            cluster_tasks.insert(
                id,
                spawn_cluster(ctx.clone(), id, group.clone(), cluster_permits.clone()),
            );
        }
    }

    // 10. join stage-2; a failed unit is evicted wholesale
    for (id, handle) in cluster_tasks {
        match handle.await {
            Ok((_, Ok(()))) => {}
            Ok((_, Err((tx_hash, e)))) => {
                warn!("cluster {} failed at {}: {}", id, tx_hash, e);
                if let Some(group) = dependent.get(&id) {
                    let hashes: HashSet<Hash> = group.keys().cloned().collect();
                    ctx.tx_cache.remove_contract_txs(&hashes);
                    ctx.contract_info.remove_all(group.keys());
                }
            }
            Err(e) => {
                if !e.is_cancelled() {
                    error!("cluster {} task failed to join: {}", id, e);
                }
            }
        }
    }
    for (tx_hash, handle) in single_tasks {
        match handle.await {
            Ok((_, Ok(()))) => {}
            Ok((_, Err((_, e)))) => {
                warn!("independent transaction {} failed: {}", tx_hash, e);
                let mut hashes = HashSet::new();
                hashes.insert(tx_hash.clone());
                ctx.tx_cache.remove_contract_txs(&hashes);
                ctx.contract_info.remove_all(std::iter::once(&tx_hash));
            }
            Err(e) => {
                if !e.is_cancelled() {
                    error!("singleton {} task failed to join: {}", tx_hash, e);
                }
            }
        }
    }

    // 11. seal whatever survived
    process_contract(ctx).await
}

async fn run_stage1<S: Storage>(
    ctx: &RuntimeContext<S>,
    request: &TxRequest,
) -> Result<(), BlockchainError> {
    let candidates = ctx.peers.qualified_peers(request.height).await?;
    if !has_packing_permission(
        &*ctx.election,
        &candidates,
        ctx.self_address(),
        request.height,
        request.tx.get_time(),
    ) {
        return Err(BlockchainError::PackingPermissionDenied(request.tx.hash()));
    }
    do_handle_tx(ctx, request).await
}

fn spawn_cluster<S: Storage>(
    ctx: Arc<RuntimeContext<S>>,
    id: u32,
    group: BTreeMap<Hash, Transaction>,
    permits: Arc<Semaphore>,
) -> JoinHandle<(u32, GroupResult)> {
    tokio::spawn(async move {
        let _permit = permits
            .acquire_owned()
            .await
            .expect("cluster pool semaphore closed");
        let result = executor::execute_contract_group(&ctx, &group).await;
        (id, result)
    })
}

fn spawn_single<S: Storage>(
    ctx: Arc<RuntimeContext<S>>,
    tx_hash: Hash,
    tx: Transaction,
    permits: Arc<Semaphore>,
) -> JoinHandle<(Hash, GroupResult)> {
    tokio::spawn(async move {
        let _permit = permits
            .acquire_owned()
            .await
            .expect("singleton pool semaphore closed");
        let mut group = BTreeMap::new();
        group.insert(tx_hash.clone(), tx);
        let result = executor::execute_contract_group(&ctx, &group).await;
        (tx_hash, result)
    })
}

/// Seal the surviving contract-pool entries into a block.
///
/// The build height is one past the highest of (cached transaction
/// heights, stored top); if the stored top is ahead, a seek task is
/// committed so the gap closes. On every exit past the empty check, the
/// contract pool and the contract-info cache are cleared and the expired
/// dirty declarations swept, in that lock order.
pub async fn process_contract<S: Storage>(
    ctx: &Arc<RuntimeContext<S>>,
) -> Result<(), BlockchainError> {
    let entries = ctx.tx_cache.contract_snapshot();
    let mut top_height = entries.iter().map(|e| e.height).max().unwrap_or(0);

    let top = ctx.storage.get_block_top().await?;
    if top > top_height {
        debug!("stored top {} ahead of cached transactions at {}", top, top_height);
        ctx.block_storage.commit_seek_task(top).await;
        top_height = top;
    }

    if entries.is_empty() {
        debug!("contract pool empty, nothing to seal");
        return Ok(());
    }

    let txs: Vec<Transaction> = entries.into_iter().map(|e| e.tx).collect();
    let result = seal_contract_block(ctx, txs, top_height + 1).await;

    ctx.tx_cache.clear_contract_pool();
    ctx.contract_info.clear();
    ctx.dirty_contracts
        .sweep_expired(get_current_time_in_micros());

    result
}

async fn seal_contract_block<S: Storage>(
    ctx: &Arc<RuntimeContext<S>>,
    txs: Vec<Transaction>,
    height: u64,
) -> Result<(), BlockchainError> {
    let edges = prehash::collect_prev_hash_edges(ctx, &txs).await?;
    if edges.is_empty() {
        debug!("no committed-state edges to confirm");
    } else {
        prehash::seek_prehash_quorum(ctx, &edges).await?;
    }

    match block_builder::build_block(ctx, txs, height).await {
        Ok(block_hash) => {
            debug!("sealed contract block {}", block_hash);
            Ok(())
        }
        Err(e) => {
            error!("contract block build failed with code {}: {}", e.code(), e);
            Err(BlockchainError::BlockBuild(e))
        }
    }
}
