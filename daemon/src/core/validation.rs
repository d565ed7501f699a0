// Transaction admission.
//
// `do_handle_tx` is the full ordinary validation run for a request: check
// the signature against the claimed identity, check the declaration shape,
// then admit into the pending pool. The packager re-runs it for every
// transaction it receives, so a dispatcher cannot smuggle an invalid
// transaction past its own checks.

use log::debug;

use crest_common::config::{CURRENT_TX_VERSION, MAX_TX_INPUTS};

use crate::core::{error::BlockchainError, runtime::RuntimeContext, storage::Storage};
use crate::p2p::packet::TxRequest;

pub async fn do_handle_tx<S: Storage>(
    ctx: &RuntimeContext<S>,
    request: &TxRequest,
) -> Result<(), BlockchainError> {
    let tx = &request.tx;
    let tx_hash = tx.hash();

    if tx.get_version() != CURRENT_TX_VERSION {
        return Err(BlockchainError::UnsupportedTxVersion {
            tx: tx_hash,
            version: tx.get_version(),
        });
    }

    if tx.get_inputs().len() > MAX_TX_INPUTS {
        return Err(BlockchainError::TooManyInputs {
            tx: tx_hash,
            count: tx.get_inputs().len(),
        });
    }

    if !tx.verify_signature() {
        return Err(BlockchainError::InvalidTransactionSignature(tx_hash));
    }

    if tx.is_contract() && request.dirty_contracts.is_empty() {
        return Err(BlockchainError::DirtyDeclarationMissing(tx_hash));
    }

    ctx.tx_cache.insert(
        tx.clone(),
        request.height,
        request.dirty_contracts.clone(),
    )?;

    if log::log_enabled!(log::Level::Debug) {
        debug!("admitted transaction {} at height {}", tx_hash, request.height);
    }
    Ok(())
}

/// Entry point for a request arriving from a peer: validate, pool, and for
/// contract transactions also queue it for the next dispatch round.
pub async fn handle_tx_request<S: Storage>(
    ctx: &RuntimeContext<S>,
    request: TxRequest,
) -> Result<(), BlockchainError> {
    do_handle_tx(ctx, &request).await?;

    if request.tx.is_contract() {
        let tx_hash = request.tx.hash();
        ctx.dispatcher
            .add_dependent_info(tx_hash.clone(), request.dirty_contracts.clone());
        ctx.dispatcher.add_msg_req(tx_hash, request);
    }
    Ok(())
}
