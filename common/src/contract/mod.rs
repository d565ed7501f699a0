use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{Address, Hash},
    transaction::TxType,
};

mod vm;

pub use vm::{ContractVm, VmError, VmOutput};

/// Virtual machine flavor a contract targets.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VmType {
    Evm,
    Wasm,
}

/// Per-transaction execution record staged between the VM run and block
/// sealing. Serialized into the block-level `storage` JSON blob keyed by
/// transaction hash.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TxStorageEntry {
    /// Storage slots written by the execution, key to value
    pub storage: IndexMap<String, String>,
    /// Previous root edge per touched contract: the tx hash this execution
    /// chains onto. Absent for a contract created in this transaction.
    pub prev_hashes: IndexMap<Address, Hash>,
    /// Transaction type the entry was produced for
    pub tx_type: TxType,
    /// Transaction format version
    pub version: u32,
    /// Dirty-contract declaration of the submitter, attached at block build
    #[serde(default)]
    pub dependent_contracts: BTreeSet<Address>,
}

impl TxStorageEntry {
    pub fn new(
        storage: IndexMap<String, String>,
        prev_hashes: IndexMap<Address, Hash>,
        tx_type: TxType,
        version: u32,
    ) -> Self {
        Self {
            storage,
            prev_hashes,
            tx_type,
            version,
            dependent_contracts: BTreeSet::new(),
        }
    }
}
