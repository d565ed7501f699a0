// Per-transaction VRF attachments.
//
// The packager records the proofs it verified so the block builder can
// attach them to the consensus envelope. Two tables: the block-level proof
// that elected the packager, and the per-transaction proof bound to one
// transaction hash.

use std::collections::HashMap;
use std::sync::Mutex;

use crest_common::{block::VrfInfo, crypto::Hash};

#[derive(Default)]
pub struct VrfRegistry {
    block_vrfs: Mutex<HashMap<Hash, VrfInfo>>,
    tx_vrfs: Mutex<HashMap<Hash, VrfInfo>>,
}

impl VrfRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_block_vrf(&self, tx_hash: Hash, info: VrfInfo) {
        self.block_vrfs
            .lock()
            .expect("vrf registry lock")
            .insert(tx_hash, info);
    }

    pub fn record_tx_vrf(&self, tx_hash: Hash, info: VrfInfo) {
        self.tx_vrfs
            .lock()
            .expect("vrf registry lock")
            .insert(tx_hash, info);
    }

    pub fn block_vrf(&self, tx_hash: &Hash) -> Option<VrfInfo> {
        self.block_vrfs
            .lock()
            .expect("vrf registry lock")
            .get(tx_hash)
            .cloned()
    }

    pub fn tx_vrf(&self, tx_hash: &Hash) -> Option<VrfInfo> {
        self.tx_vrfs
            .lock()
            .expect("vrf registry lock")
            .get(tx_hash)
            .cloned()
    }

    pub fn remove(&self, tx_hash: &Hash) {
        self.block_vrfs
            .lock()
            .expect("vrf registry lock")
            .remove(tx_hash);
        self.tx_vrfs
            .lock()
            .expect("vrf registry lock")
            .remove(tx_hash);
    }
}
