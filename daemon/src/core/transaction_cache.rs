// Pending transaction pools and the ordinary-pool block builder.
//
// Two pools: ordinary transactions keyed by target height, and contract
// transactions in insertion order. Inserts enforce double-spend exclusion
// against the pool the transaction belongs to. The ordinary pool is
// flushed into a block by a background task woken by a periodic tick or by
// the size threshold; the contract pool is consumed only by the packager
// handler after a dispatch round.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::Notify;

use crest_common::{
    block::Height,
    crypto::{Address, Hash},
    transaction::Transaction,
};

use crate::config::{BUILD_INTERVAL_MS, BUILD_THRESHOLD};
use crate::core::{
    block_builder, checker, error::BlockchainError, runtime::RuntimeContext, storage::Storage,
};

pub struct OrdinaryEntry {
    pub tx: Transaction,
    pub height: Height,
    pub consumed: bool,
}

#[derive(Clone)]
pub struct ContractEntry {
    pub tx: Transaction,
    pub height: Height,
    pub consumed: bool,
    /// Storage addresses the submitter declared dirty
    pub dependent_contracts: Vec<Address>,
}

#[derive(Default)]
pub struct TransactionCache {
    ordinary: Mutex<BTreeMap<Height, Vec<OrdinaryEntry>>>,
    contracts: Mutex<Vec<ContractEntry>>,
    build_notify: Notify,
    running: AtomicBool,
}

impl TransactionCache {
    pub fn new() -> Self {
        let cache = Self::default();
        cache.running.store(true, Ordering::SeqCst);
        cache
    }

    /// Admit a transaction into the pool matching its type. Fails on a
    /// double spend against that pool.
    pub fn insert(
        &self,
        tx: Transaction,
        height: Height,
        dependent_contracts: Vec<Address>,
    ) -> Result<(), BlockchainError> {
        let tx_hash = tx.hash();
        if tx.is_contract() {
            let mut pool = self.contracts.lock().expect("contract pool lock");
            if checker::has_conflict(&tx, pool.iter().map(|e| &e.tx)) {
                debug!("double spent contract transaction {}", tx_hash);
                return Err(BlockchainError::TxConflict(tx_hash));
            }
            pool.push(ContractEntry {
                tx,
                height,
                consumed: false,
                dependent_contracts,
            });
        } else {
            let mut pool = self.ordinary.lock().expect("ordinary pool lock");
            if checker::has_conflict(&tx, pool.values().flatten().map(|e| &e.tx)) {
                debug!("double spent transaction {}", tx_hash);
                return Err(BlockchainError::TxConflict(tx_hash));
            }
            let entries = pool.entry(height).or_default();
            entries.push(OrdinaryEntry {
                tx,
                height,
                consumed: false,
            });
            if entries.len() >= BUILD_THRESHOLD {
                self.build_notify.notify_one();
            }
        }
        Ok(())
    }

    pub fn ordinary_len(&self) -> usize {
        self.ordinary
            .lock()
            .expect("ordinary pool lock")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn contract_len(&self) -> usize {
        self.contracts.lock().expect("contract pool lock").len()
    }

    /// Atomically take every ordinary entry across all heights, in height
    /// then insertion order, together with the build target height
    /// (max height + 1). The pool ends empty either way: a failed build
    /// does not resurrect its transactions.
    pub fn drain_ordinary(&self) -> Option<(Vec<Transaction>, Height)> {
        let mut pool = self.ordinary.lock().expect("ordinary pool lock");
        let target_height = *pool.keys().next_back()? + 1;
        let mut txs = Vec::new();
        for (_, mut entries) in std::mem::take(&mut *pool) {
            for entry in entries.iter_mut() {
                entry.consumed = true;
            }
            txs.extend(entries.into_iter().map(|e| e.tx));
        }
        Some((txs, target_height))
    }

    pub fn contract_snapshot(&self) -> Vec<ContractEntry> {
        self.contracts.lock().expect("contract pool lock").clone()
    }

    pub fn clear_contract_pool(&self) {
        self.contracts.lock().expect("contract pool lock").clear();
    }

    /// Evict specific contract transactions, used when a cluster fails
    /// execution.
    pub fn remove_contract_txs(&self, tx_hashes: &HashSet<Hash>) {
        let mut pool = self.contracts.lock().expect("contract pool lock");
        pool.retain(|entry| !tx_hashes.contains(&entry.tx.hash()));
    }

    pub fn notify_builder(&self) {
        self.build_notify.notify_one();
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.build_notify.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Spawn the tick task and the builder task for the ordinary pool.
pub fn start_ordinary_builder<S: Storage>(ctx: Arc<RuntimeContext<S>>) {
    let ticker_ctx = ctx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(BUILD_INTERVAL_MS));
        // the first tick fires immediately, skip it
        interval.tick().await;
        while ticker_ctx.tx_cache.is_running() {
            interval.tick().await;
            ticker_ctx.tx_cache.notify_builder();
        }
    });

    tokio::spawn(async move {
        while ctx.tx_cache.is_running() {
            ctx.tx_cache.build_notify.notified().await;
            if !ctx.tx_cache.is_running() {
                break;
            }
            let Some((txs, target_height)) = ctx.tx_cache.drain_ordinary() else {
                continue;
            };
            let count = txs.len();
            match block_builder::build_block(&ctx, txs, target_height).await {
                Ok(block_hash) => {
                    info!(
                        "built block {} at height {} with {} transactions",
                        block_hash, target_height, count
                    );
                }
                Err(e) => {
                    error!("block build failed with code {}: {}", e.code(), e);
                    warn!("{} transactions dropped with the failed round", count);
                }
            }
        }
    });
}
