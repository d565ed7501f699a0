use serde::{Deserialize, Serialize};

use crate::{
    contract::VmType,
    crypto::{Address, Hash},
};

/// Payload of an ordinary value transfer.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TransferPayload {
    pub to: Address,
    pub amount: u64,
}

/// Payload of a contract deployment.
///
/// The submitter signs with its base58 identity but owns the contract under
/// an EVM-style address; the executor checks the two agree.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeployContractPayload {
    pub owner_evm_addr: String,
    pub vm_type: VmType,
    /// Hex-encoded contract bytecode
    pub code: String,
    /// Address the contract will live at once the deploy commits
    pub transient_address: Address,
}

/// Payload of a contract call.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CallContractPayload {
    pub owner_evm_addr: String,
    pub vm_type: VmType,
    pub deployer_addr: Address,
    pub deploy_hash: Hash,
    /// Hex-encoded call data
    pub input: String,
    /// Native value moved into the contract alongside the call
    pub transfer_amount: u64,
}
