// Contract dispatcher.
//
// Collects verified contract requests between rounds, and every round
// partitions them into dependency clusters, elects a packager per cluster
// through the VRF, and forwards each cluster to its packager. A round that
// cannot complete is abandoned silently: the transactions stay in the
// submitters' contract pools and come back on a later round.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crest_common::{
    block::{VrfData, VrfInfo},
    config::NETWORK_VERSION,
    crypto::{vrf, Address, Hash},
};

use crate::config::CONTRACT_WAITING_TIME_MICROS;
use crate::core::{
    error::BlockchainError, pack_dispatch::PackDispatch, runtime::RuntimeContext,
    storage::Storage,
};
use crate::p2p::messaging::SendFlags;
use crate::p2p::packet::{ContractPackagerMessage, Packet, TxRequest};

#[derive(Default)]
struct DispatchTables {
    dependents: HashMap<Hash, Vec<Address>>,
    requests: HashMap<Hash, TxRequest>,
}

#[derive(Default)]
pub struct ContractDispatcher {
    tables: Mutex<DispatchTables>,
    running: AtomicBool,
}

impl ContractDispatcher {
    pub fn new() -> Self {
        let dispatcher = Self::default();
        dispatcher.running.store(true, Ordering::SeqCst);
        dispatcher
    }

    /// Record which contracts a pending transaction declared dirty.
    pub fn add_dependent_info(&self, tx_hash: Hash, dependent_contracts: Vec<Address>) {
        let mut tables = self.tables.lock().expect("dispatcher lock");
        tables.dependents.insert(tx_hash, dependent_contracts);
    }

    /// Record the verified request itself, keyed by its content hash.
    pub fn add_msg_req(&self, tx_hash: Hash, request: TxRequest) {
        let mut tables = self.tables.lock().expect("dispatcher lock");
        tables.requests.insert(tx_hash, request);
    }

    pub fn pending_len(&self) -> usize {
        self.tables.lock().expect("dispatcher lock").requests.len()
    }

    pub fn clear(&self) {
        let mut tables = self.tables.lock().expect("dispatcher lock");
        tables.dependents.clear();
        tables.requests.clear();
    }

    // Snapshot and drain both tables for a round.
    fn take_tables(&self) -> (HashMap<Hash, Vec<Address>>, HashMap<Hash, TxRequest>) {
        let mut tables = self.tables.lock().expect("dispatcher lock");
        (
            std::mem::take(&mut tables.dependents),
            std::mem::take(&mut tables.requests),
        )
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The VRF input for a group of transactions: SHA-256 over the member
/// hashes concatenated smallest-first. Dispatcher and packager derive the
/// same input independently.
pub fn cluster_vrf_input<'a, I: IntoIterator<Item = &'a Hash>>(hashes: I) -> [u8; 32] {
    let mut sorted: Vec<&Hash> = hashes.into_iter().collect();
    sorted.sort();
    let mut concatenated = Vec::with_capacity(sorted.len() * 32);
    for hash in sorted {
        concatenated.extend_from_slice(hash.as_bytes());
    }
    vrf::sha256(&concatenated)
}

/// Spawn the dispatcher loop.
pub fn start_dispatcher<S: Storage>(ctx: Arc<RuntimeContext<S>>) {
    tokio::spawn(async move {
        let period = Duration::from_micros(CONTRACT_WAITING_TIME_MICROS);
        while ctx.dispatcher.is_running() {
            tokio::time::sleep(period).await;
            if let Err(e) = dispatch_round(&ctx).await {
                // abandoned round; transactions are retried next tick
                debug!("dispatch round abandoned: {}", e);
            }
        }
    });
}

/// One dispatch round over the drained tables.
pub async fn dispatch_round<S: Storage>(
    ctx: &RuntimeContext<S>,
) -> Result<(), BlockchainError> {
    let (dependents, requests) = ctx.dispatcher.take_tables();
    if requests.is_empty() {
        return Ok(());
    }

    // deterministic input order for the partitioner
    let ordered: BTreeMap<Hash, TxRequest> = requests.into_iter().collect();
    let mut pack = PackDispatch::new();
    for (tx_hash, request) in &ordered {
        let dirty = dependents
            .get(tx_hash)
            .cloned()
            .unwrap_or_else(|| request.dirty_contracts.clone());
        pack.add(tx_hash.clone(), dirty, request.tx.clone());
    }
    let groups = pack.into_groups();

    let top = ctx.storage.get_block_top().await?;
    let candidates = ctx.peers.qualified_peers(top).await?;
    if candidates.is_empty() {
        return Err(BlockchainError::NoQualifiedPeers);
    }

    for unit in groups.execution_units() {
        let input = cluster_vrf_input(unit.keys());
        let (output, proof) = vrf::prove(&ctx.keypair, &input);
        let rand = output.to_unit_interval();
        let packager = ctx
            .election
            .packer_from_random(rand, &candidates)
            .ok_or(BlockchainError::NoQualifiedPeers)?;

        let tx_requests: Vec<TxRequest> = unit
            .keys()
            .filter_map(|hash| ordered.get(hash).cloned())
            .collect();
        if tx_requests.is_empty() {
            continue;
        }

        let vrf_info = VrfInfo {
            data: VrfData {
                output,
                height: top,
                tx_hash: None,
            },
            pubkey: ctx.keypair.public_key(),
            proof,
        };
        let mut msg = ContractPackagerMessage::new(
            NETWORK_VERSION,
            tx_requests,
            vrf_info,
            candidates.clone(),
        );
        msg.sign(&ctx.keypair);

        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "dispatching {} transaction(s) to packager {}",
                unit.len(),
                packager
            );
        }
        if let Err(e) = ctx
            .messenger
            .send(&packager, Packet::ContractPackager(msg), SendFlags::high_priority())
            .await
        {
            warn!("failed to reach packager {}: {}", packager, e);
            return Err(e);
        }
    }
    Ok(())
}
