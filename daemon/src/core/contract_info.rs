// Staged contract execution results.
//
// Written by the executor, read by the block builder and the pre-hash
// reconciliation, cleared after a block is sealed. Reads outnumber writes
// once execution finishes, hence the reader-writer lock.

use std::collections::HashMap;
use std::sync::RwLock;

use crest_common::{contract::TxStorageEntry, crypto::Hash, time::TimestampMicros};

struct InfoEntry {
    entry: TxStorageEntry,
    tx_time: TimestampMicros,
}

#[derive(Default)]
pub struct ContractInfoCache {
    entries: RwLock<HashMap<Hash, InfoEntry>>,
}

impl ContractInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx_hash: Hash, entry: TxStorageEntry, tx_time: TimestampMicros) {
        let mut entries = self.entries.write().expect("contract info lock");
        entries.insert(tx_hash, InfoEntry { entry, tx_time });
    }

    pub fn get(&self, tx_hash: &Hash) -> Option<TxStorageEntry> {
        let entries = self.entries.read().expect("contract info lock");
        entries.get(tx_hash).map(|e| e.entry.clone())
    }

    pub fn contains(&self, tx_hash: &Hash) -> bool {
        let entries = self.entries.read().expect("contract info lock");
        entries.contains_key(tx_hash)
    }

    /// Creation time of the transaction an entry was staged for.
    pub fn tx_time(&self, tx_hash: &Hash) -> Option<TimestampMicros> {
        let entries = self.entries.read().expect("contract info lock");
        entries.get(tx_hash).map(|e| e.tx_time)
    }

    pub fn remove_all<'a, I: IntoIterator<Item = &'a Hash>>(&self, tx_hashes: I) {
        let mut entries = self.entries.write().expect("contract info lock");
        for tx_hash in tx_hashes {
            if entries.remove(tx_hash).is_some() && log::log_enabled!(log::Level::Debug) {
                log::debug!("dropped staged storage for {}", tx_hash);
            }
        }
    }

    pub fn clear(&self) {
        self.entries.write().expect("contract info lock").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("contract info lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
