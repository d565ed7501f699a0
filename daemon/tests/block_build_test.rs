// Block-build failure semantics: the banded return channel, the forced
// seek on previous-hash failures, and round-abandonment leaving caches
// intact.

mod common;

use common::*;
use crest_common::contract::TxStorageEntry;
use crest_common::crypto::hash;
use crest_common::transaction::TxType;
use crest_daemon::core::block_builder::build_block;
use indexmap::IndexMap;

#[tokio::test]
async fn empty_input_is_rejected() {
    let node = make_node(Vec::new());
    let err = build_block(&node.ctx, Vec::new(), 100).await.unwrap_err();
    assert_eq!(err.code(), -1);
    assert!(node.consensus.received.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn prev_hash_timeout_fails_and_forces_seek() {
    let node = make_node(Vec::new());
    // the future for height 99 never resolves
    node.block_storage.set_hanging(99);

    // soft state staged before the build survives the failure untouched
    let submitter = Submitter::new();
    let parked = call_tx(&submitter, "parked-input");
    node.ctx
        .tx_cache
        .insert(parked.clone(), 99, vec![contract_addr(b"c")])
        .unwrap();
    node.ctx.contract_info.insert(
        parked.hash(),
        TxStorageEntry::new(IndexMap::new(), IndexMap::new(), TxType::CallContract, 1),
        parked.get_time(),
    );

    let txs = vec![transfer_tx(b"u1")];
    let err = build_block(&node.ctx, txs, 100).await.unwrap_err();
    assert_eq!(err.code(), -104);

    assert_eq!(
        node.block_storage.forced_seeks.lock().unwrap().as_slice(),
        &[99]
    );
    assert!(node.consensus.received.lock().unwrap().is_empty());

    // round abandonment: nothing was cleared
    assert_eq!(node.ctx.tx_cache.contract_len(), 1);
    assert!(node.ctx.contract_info.contains(&parked.hash()));
}

#[tokio::test]
async fn prev_hash_unavailable_and_empty_have_their_own_codes() {
    let node = make_node(Vec::new());
    node.block_storage.set_unavailable(99);
    let err = build_block(&node.ctx, vec![transfer_tx(b"u1")], 100)
        .await
        .unwrap_err();
    assert_eq!(err.code(), -103);

    node.block_storage.set_prev_hash_empty(199);
    let err = build_block(&node.ctx, vec![transfer_tx(b"u2")], 200)
        .await
        .unwrap_err();
    assert_eq!(err.code(), -105);

    assert_eq!(
        node.block_storage.forced_seeks.lock().unwrap().as_slice(),
        &[99, 199]
    );
}

#[tokio::test]
async fn contract_tx_without_staged_storage_fails_the_build() {
    let node = make_node(Vec::new());
    node.block_storage.set_prev_hash(99, hash(b"block-99"));

    let submitter = Submitter::new();
    let tx = call_tx(&submitter, "input");
    // neither a storage entry nor a dirty declaration exists for it
    let err = build_block(&node.ctx, vec![tx], 100).await.unwrap_err();
    assert_eq!(err.code(), -102);
    // a missing entry is not a prev-hash failure, no seek is forced
    assert!(node.block_storage.forced_seeks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_vrf_attachment_fails_the_build() {
    let node = make_node(Vec::new());
    node.block_storage.set_prev_hash(99, hash(b"block-99"));

    let submitter = Submitter::new();
    let tx = call_tx(&submitter, "input");
    node.ctx.dirty_contracts
        .register(tx.hash(), vec![contract_addr(b"c")]);
    node.ctx.contract_info.insert(
        tx.hash(),
        TxStorageEntry::new(IndexMap::new(), IndexMap::new(), TxType::CallContract, 1),
        tx.get_time(),
    );

    // the transaction was routed through a packager but no proof was ever
    // recorded
    let err = build_block(&node.ctx, vec![tx], 100).await.unwrap_err();
    assert_eq!(err.code(), -3000);
}

#[tokio::test]
async fn consensus_rejection_is_banded() {
    let node = make_node(Vec::new());
    node.block_storage.set_prev_hash(99, hash(b"block-99"));
    *node.consensus.fail_code.lock().unwrap() = Some(-7);

    let err = build_block(&node.ctx, vec![transfer_tx(b"u1")], 100)
        .await
        .unwrap_err();
    assert_eq!(err.code(), -4007);
}
