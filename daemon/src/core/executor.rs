// Contract execution adaptor.
//
// Runs the transactions of one dependency cluster serially in hash order,
// feeding each VM result into the contract-info cache. The per-batch
// pre-hash cache threads the in-block chain: when several transactions in
// one batch touch the same contract, each chains onto the previous one
// instead of the on-disk root.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use log::{debug, error};

use crest_common::{
    contract::{TxStorageEntry, VmOutput},
    crypto::{Address, Hash},
    time::get_current_time_in_micros,
    transaction::{CallContractPayload, DeployContractPayload, Transaction, TxType},
};

use crate::core::{error::BlockchainError, runtime::RuntimeContext, storage::Storage};

/// Execute one cluster. Members run serially in the map's (hash-sorted)
/// iteration order; the first failure aborts the cluster and names the
/// offending transaction.
pub async fn execute_contract_group<S: Storage>(
    ctx: &RuntimeContext<S>,
    group: &BTreeMap<Hash, Transaction>,
) -> Result<(), (Hash, BlockchainError)> {
    let started = get_current_time_in_micros();
    let mut prehash_cache: HashMap<Address, Hash> = HashMap::new();

    for (tx_hash, tx) in group {
        if !tx.is_contract() {
            return Err((
                tx_hash.clone(),
                BlockchainError::NotAContractTransaction(tx_hash.clone()),
            ));
        }
        if let Err(e) = stage_contract_info(ctx, tx, &mut prehash_cache).await {
            error!("contract execution failed for {}: {}", tx_hash, e);
            return Err((tx_hash.clone(), e));
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        debug!(
            "executed cluster of {} transactions in {} us",
            group.len(),
            get_current_time_in_micros().saturating_sub(started)
        );
    }
    Ok(())
}

// Run one transaction through the VM, reconcile its declaration, thread
// the pre-hash chain, and stage the resulting storage entry.
async fn stage_contract_info<S: Storage>(
    ctx: &RuntimeContext<S>,
    tx: &Transaction,
    prehash_cache: &mut HashMap<Address, Hash>,
) -> Result<(), BlockchainError> {
    let tx_hash = tx.hash();
    let is_deploy = tx.get_tx_type() == TxType::DeployContract;

    let output = run_vm(ctx, tx, &tx_hash).await?;

    // the VM may touch at most what the submitter declared
    let declared = ctx
        .dirty_contracts
        .get(&tx_hash)
        .ok_or_else(|| BlockchainError::DirtyDeclarationMissing(tx_hash.clone()))?;
    let undeclared: Vec<Address> = output
        .touched
        .iter()
        .filter(|addr| !declared.contains(*addr))
        .cloned()
        .collect();
    if !undeclared.is_empty() {
        return Err(BlockchainError::DirtyDeclarationExceeded {
            tx: tx_hash,
            undeclared,
        });
    }

    let mut prev_hashes = IndexMap::new();
    for addr in &output.touched {
        let prev = match prehash_cache.get(addr) {
            Some(prev) => Some(prev.clone()),
            None => ctx.storage.get_latest_utxo_by_contract_addr(addr).await?,
        };
        match prev {
            Some(prev) => {
                prev_hashes.insert(addr.clone(), prev);
            }
            // a contract born in this transaction has no previous root
            None if is_deploy => {}
            None => return Err(BlockchainError::PrevRootLookupMiss(addr.clone())),
        }
        prehash_cache.insert(addr.clone(), tx_hash.clone());
    }

    let entry = TxStorageEntry::new(
        output.storage,
        prev_hashes,
        tx.get_tx_type(),
        tx.get_version(),
    );
    ctx.contract_info.insert(tx_hash, entry, tx.get_time());
    Ok(())
}

// Parse the payload, check the owner translation, invoke the VM.
async fn run_vm<S: Storage>(
    ctx: &RuntimeContext<S>,
    tx: &Transaction,
    tx_hash: &Hash,
) -> Result<VmOutput, BlockchainError> {
    match tx.get_tx_type() {
        TxType::DeployContract => {
            let payload: DeployContractPayload =
                tx.parse_data().map_err(|e| BlockchainError::PayloadParse {
                    tx: tx_hash.clone(),
                    reason: e.to_string(),
                })?;
            verify_owner(tx, tx_hash, &payload.owner_evm_addr)?;
            ctx.vm
                .deploy(
                    tx.get_identity(),
                    &payload.owner_evm_addr,
                    &payload.code,
                    &payload.transient_address,
                )
                .await
                .map_err(|source| BlockchainError::VmDeploy {
                    tx: tx_hash.clone(),
                    source,
                })
        }
        TxType::CallContract => {
            let payload: CallContractPayload =
                tx.parse_data().map_err(|e| BlockchainError::PayloadParse {
                    tx: tx_hash.clone(),
                    reason: e.to_string(),
                })?;
            verify_owner(tx, tx_hash, &payload.owner_evm_addr)?;
            ctx.vm
                .call(
                    tx.get_identity(),
                    &payload.owner_evm_addr,
                    &payload.deployer_addr,
                    &payload.deploy_hash,
                    &payload.input,
                    payload.transfer_amount,
                )
                .await
                .map_err(|source| BlockchainError::VmCall {
                    tx: tx_hash.clone(),
                    source,
                })
        }
        _ => Err(BlockchainError::NotAContractTransaction(tx_hash.clone())),
    }
}

// The base58 translation of the declared EVM owner must equal the
// transaction's signing identity.
fn verify_owner(
    tx: &Transaction,
    tx_hash: &Hash,
    owner_evm_addr: &str,
) -> Result<(), BlockchainError> {
    let translated = Address::from_evm_hex(owner_evm_addr)?;
    if translated != *tx.get_identity() {
        return Err(BlockchainError::OwnerAddressMismatch {
            tx: tx_hash.clone(),
        });
    }
    Ok(())
}
