// Executor adaptor behavior: payload checks, dirty reconciliation,
// pre-hash threading, and independence commutativity.

mod common;

use std::collections::BTreeMap;

use common::*;
use crest_common::contract::{TxStorageEntry, VmOutput};
use crest_common::crypto::{hash, Address, Hash};
use crest_common::transaction::Transaction;
use crest_daemon::core::error::BlockchainError;
use crest_daemon::core::executor::execute_contract_group;
use indexmap::IndexMap;

fn group_of(txs: &[&Transaction]) -> BTreeMap<Hash, Transaction> {
    txs.iter().map(|tx| (tx.hash(), (*tx).clone())).collect()
}

fn touching(touched: Vec<Address>) -> VmOutput {
    VmOutput {
        touched,
        ..Default::default()
    }
}

#[tokio::test]
async fn owner_mismatch_is_rejected() {
    let node = make_node(Vec::new());
    let submitter = Submitter::new();
    let stranger = Submitter::new();

    // payload claims a different owner than the signing identity
    let payload = crest_common::transaction::CallContractPayload {
        owner_evm_addr: stranger.evm_hex(),
        vm_type: crest_common::contract::VmType::Evm,
        deployer_addr: submitter.identity.clone(),
        deploy_hash: hash(b"deploy"),
        input: "input".to_string(),
        transfer_amount: 0,
    };
    let mut tx = Transaction::new(
        1,
        crest_common::transaction::TxType::CallContract,
        submitter.identity.clone(),
        1,
        Vec::new(),
        serde_json::to_string(&payload).unwrap(),
    );
    tx.sign(&submitter.keypair);
    node.ctx
        .dirty_contracts
        .register(tx.hash(), vec![contract_addr(b"c1")]);

    let (failed, err) = execute_contract_group(&node.ctx, &group_of(&[&tx]))
        .await
        .unwrap_err();
    assert_eq!(failed, tx.hash());
    assert!(matches!(err, BlockchainError::OwnerAddressMismatch { .. }));
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let node = make_node(Vec::new());
    let submitter = Submitter::new();
    let mut tx = Transaction::new(
        1,
        crest_common::transaction::TxType::CallContract,
        submitter.identity.clone(),
        1,
        Vec::new(),
        "not json".to_string(),
    );
    tx.sign(&submitter.keypair);
    node.ctx
        .dirty_contracts
        .register(tx.hash(), vec![contract_addr(b"c1")]);

    let (_, err) = execute_contract_group(&node.ctx, &group_of(&[&tx]))
        .await
        .unwrap_err();
    assert!(matches!(err, BlockchainError::PayloadParse { .. }));
}

#[tokio::test]
async fn missing_dirty_declaration_fails_execution() {
    let node = make_node(Vec::new());
    let submitter = Submitter::new();
    let tx = call_tx(&submitter, "input");
    node.vm
        .program("input", Ok(touching(vec![contract_addr(b"c1")])));

    // nothing registered for the transaction
    let (_, err) = execute_contract_group(&node.ctx, &group_of(&[&tx]))
        .await
        .unwrap_err();
    assert!(matches!(err, BlockchainError::DirtyDeclarationMissing(_)));
}

#[tokio::test]
async fn call_on_unknown_contract_root_fails() {
    let node = make_node(Vec::new());
    let submitter = Submitter::new();
    let c1 = contract_addr(b"c1");
    let tx = call_tx(&submitter, "input");
    node.vm.program("input", Ok(touching(vec![c1.clone()])));
    node.ctx.dirty_contracts.register(tx.hash(), vec![c1]);
    // no root in storage for c1

    let (_, err) = execute_contract_group(&node.ctx, &group_of(&[&tx]))
        .await
        .unwrap_err();
    assert!(matches!(err, BlockchainError::PrevRootLookupMiss(_)));
}

#[tokio::test]
async fn deploy_creates_a_root_later_calls_chain_onto() {
    let node = make_node(Vec::new());
    let submitter = Submitter::new();
    let new_contract = contract_addr(b"new-contract");

    let deploy = deploy_tx(&submitter, "code", &new_contract);
    let call = call_tx(&submitter, "input");
    node.vm
        .program("code", Ok(touching(vec![new_contract.clone()])));
    node.vm
        .program("input", Ok(touching(vec![new_contract.clone()])));
    node.ctx
        .dirty_contracts
        .register(deploy.hash(), vec![new_contract.clone()]);
    node.ctx
        .dirty_contracts
        .register(call.hash(), vec![new_contract.clone()]);

    // same batch: the deploy has no previous root, the call chains onto
    // the deploy. Both declare the same address so they share a cluster.
    let group = group_of(&[&deploy, &call]);
    // deploy must run first for the chain to exist; if the call sorts
    // first the executor is expected to fail the lookup instead
    if group.keys().next().unwrap() == &deploy.hash() {
        execute_contract_group(&node.ctx, &group).await.unwrap();

        let deploy_entry = node.ctx.contract_info.get(&deploy.hash()).unwrap();
        assert!(deploy_entry.prev_hashes.is_empty());

        let call_entry = node.ctx.contract_info.get(&call.hash()).unwrap();
        assert_eq!(call_entry.prev_hashes[&new_contract], deploy.hash());
    } else {
        let (failed, err) = execute_contract_group(&node.ctx, &group).await.unwrap_err();
        assert_eq!(failed, call.hash());
        assert!(matches!(err, BlockchainError::PrevRootLookupMiss(_)));
    }
}

#[tokio::test]
async fn independent_groups_commute() {
    let c1 = contract_addr(b"c1");
    let c2 = contract_addr(b"c2");
    let s1 = Submitter::new();
    let s2 = Submitter::new();
    let tx_a = call_tx(&s1, "input-a");
    let tx_b = call_tx(&s2, "input-b");

    let mut out_a = touching(vec![c1.clone()]);
    out_a.storage.insert("slot-a".to_string(), "1".to_string());
    let mut out_b = touching(vec![c2.clone()]);
    out_b.storage.insert("slot-b".to_string(), "2".to_string());

    let run = |order: Vec<Transaction>| {
        let c1 = c1.clone();
        let c2 = c2.clone();
        let out_a = out_a.clone();
        let out_b = out_b.clone();
        let tx_a = tx_a.clone();
        let tx_b = tx_b.clone();
        async move {
            let node = make_node(Vec::new());
            node.storage.set_contract_root(c1.clone(), hash(b"root-c1"));
            node.storage.set_contract_root(c2.clone(), hash(b"root-c2"));
            node.vm.program("input-a", Ok(out_a));
            node.vm.program("input-b", Ok(out_b));
            node.ctx.dirty_contracts.register(tx_a.hash(), vec![c1]);
            node.ctx.dirty_contracts.register(tx_b.hash(), vec![c2]);

            for tx in &order {
                execute_contract_group(&node.ctx, &group_of(&[tx]))
                    .await
                    .unwrap();
            }
            (
                node.ctx.contract_info.get(&tx_a.hash()).unwrap(),
                node.ctx.contract_info.get(&tx_b.hash()).unwrap(),
            )
        }
    };

    let (a_first_a, a_first_b) = run(vec![tx_a.clone(), tx_b.clone()]).await;
    let (b_first_a, b_first_b) = run(vec![tx_b.clone(), tx_a.clone()]).await;

    let as_json = |entry: &TxStorageEntry| serde_json::to_string(entry).unwrap();
    assert_eq!(as_json(&a_first_a), as_json(&b_first_a));
    assert_eq!(as_json(&a_first_b), as_json(&b_first_b));
}

#[tokio::test]
async fn vm_storage_lands_in_the_staged_entry() {
    let node = make_node(Vec::new());
    let submitter = Submitter::new();
    let c1 = contract_addr(b"c1");
    let tx = call_tx(&submitter, "input");

    let mut storage = IndexMap::new();
    storage.insert("balance:bob".to_string(), "7".to_string());
    node.vm.program(
        "input",
        Ok(VmOutput {
            storage,
            touched: vec![c1.clone()],
            gas_used: 40_000,
            return_data: String::new(),
        }),
    );
    node.storage.set_contract_root(c1.clone(), hash(b"root-c1"));
    node.ctx.dirty_contracts.register(tx.hash(), vec![c1.clone()]);

    execute_contract_group(&node.ctx, &group_of(&[&tx]))
        .await
        .unwrap();

    let entry = node.ctx.contract_info.get(&tx.hash()).unwrap();
    assert_eq!(entry.storage["balance:bob"], "7");
    assert_eq!(entry.prev_hashes[&c1], hash(b"root-c1"));
}
