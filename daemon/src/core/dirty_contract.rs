// Dirty-contract declarations.
//
// Submitters declare up front which contract storage addresses their call
// will write. Execution is rejected if the VM touches anything outside the
// declaration, and the block builder attaches the declared set into the
// sealed block. Records expire after a fixed TTL, swept lazily at
// block-build time.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crest_common::{
    crypto::{Address, Hash},
    time::{get_current_time_in_micros, TimestampMicros},
};

use crate::config::DIRTY_CONTRACT_EXPIRY_MICROS;

struct DirtyRecord {
    inserted_at: TimestampMicros,
    contracts: BTreeSet<Address>,
}

#[derive(Default)]
pub struct DirtyContractRegistry {
    entries: Mutex<HashMap<Hash, DirtyRecord>>,
}

impl DirtyContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the declaration for a transaction, stamped now.
    pub fn register<I: IntoIterator<Item = Address>>(&self, tx_hash: Hash, contracts: I) {
        let record = DirtyRecord {
            inserted_at: get_current_time_in_micros(),
            contracts: contracts.into_iter().collect(),
        };
        let mut entries = self.entries.lock().expect("dirty contract lock");
        entries.insert(tx_hash, record);
    }

    pub fn get(&self, tx_hash: &Hash) -> Option<BTreeSet<Address>> {
        let entries = self.entries.lock().expect("dirty contract lock");
        entries.get(tx_hash).map(|record| record.contracts.clone())
    }

    pub fn contains(&self, tx_hash: &Hash) -> bool {
        let entries = self.entries.lock().expect("dirty contract lock");
        entries.contains_key(tx_hash)
    }

    /// Drop every record older than the declaration TTL.
    pub fn sweep_expired(&self, now: TimestampMicros) {
        let mut entries = self.entries.lock().expect("dirty contract lock");
        entries.retain(|tx_hash, record| {
            let keep = now < record.inserted_at + DIRTY_CONTRACT_EXPIRY_MICROS;
            if !keep && log::log_enabled!(log::Level::Debug) {
                log::debug!("expiring dirty-contract record for {}", tx_hash);
            }
            keep
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("dirty contract lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
