// Contract execution behind a trait.
//
// The node core never links a VM directly; the daemon injects an
// implementation through this seam. The VM reports every contract address
// it actually touched so the caller can reconcile the run against the
// submitter's dirty-contract declaration.

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use crate::crypto::{Address, Hash};

#[derive(Debug, Error)]
pub enum VmError {
    #[error("VM execution failed with code {code}: {message}")]
    Execution { code: i32, message: String },

    #[error("Unsupported bytecode or VM type")]
    Unsupported,
}

impl VmError {
    /// Inner VM code, for the banded operator logs.
    pub fn code(&self) -> i32 {
        match self {
            VmError::Execution { code, .. } => *code,
            VmError::Unsupported => -1,
        }
    }
}

/// Result of a deploy or call run.
#[derive(Debug, Clone, Default)]
pub struct VmOutput {
    /// Storage slots written, key to value
    pub storage: IndexMap<String, String>,
    /// Every contract address the run touched
    pub touched: Vec<Address>,
    /// Gas consumed
    pub gas_used: u64,
    /// Hex-encoded return data
    pub return_data: String,
}

#[async_trait]
pub trait ContractVm: Send + Sync + 'static {
    /// Deploy `code` under `transient_address` on behalf of `from`.
    async fn deploy(
        &self,
        from: &Address,
        owner_evm_addr: &str,
        code: &str,
        transient_address: &Address,
    ) -> Result<VmOutput, VmError>;

    /// Call a deployed contract on behalf of `from`.
    async fn call(
        &self,
        from: &Address,
        owner_evm_addr: &str,
        deployer_addr: &Address,
        deploy_hash: &Hash,
        input: &str,
        transfer_amount: u64,
    ) -> Result<VmOutput, VmError>;
}
