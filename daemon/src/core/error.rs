use thiserror::Error;

use crest_common::{
    block::Height,
    contract::VmError,
    crypto::{Address, AddressError, Hash, VrfError},
};

#[derive(Debug, Error)]
pub enum BlockchainError {
    // double spend against a pending pool
    #[error("Transaction {0} spends an input already pending")]
    TxConflict(Hash),

    #[error("Packager message signature verification failed")]
    InvalidPackagerSignature,

    #[error("Packager message VRF verification failed")]
    InvalidVrfProof(#[source] VrfError),

    #[error("VRF node list does not match the qualified peer set at height {height}")]
    VrfSourceMismatch { height: Height },

    #[error("This node is not the elected packager, expected {elected}")]
    NotElectedPackager { elected: Address },

    #[error("Dispatcher {0} is not in the qualified peer set")]
    DispatcherNotQualified(Address),

    #[error("Packager message carries no transactions")]
    EmptyPackagerMessage,

    #[error("No packing permission for transaction {0} in its time window")]
    PackingPermissionDenied(Hash),

    #[error("Transaction {0} signature verification failed")]
    InvalidTransactionSignature(Hash),

    #[error("Transaction {0} is not a contract transaction")]
    NotAContractTransaction(Hash),

    #[error("Transaction {tx} payload parse failed: {reason}")]
    PayloadParse { tx: Hash, reason: String },

    #[error("Transaction {tx} owner address does not match its identity")]
    OwnerAddressMismatch { tx: Hash },

    #[error("No dirty-contract declaration registered for transaction {0}")]
    DirtyDeclarationMissing(Hash),

    #[error("Transaction {tx} touched contracts outside its declaration")]
    DirtyDeclarationExceeded { tx: Hash, undeclared: Vec<Address> },

    #[error("VM deploy failed for transaction {tx}")]
    VmDeploy {
        tx: Hash,
        #[source]
        source: VmError,
    },

    #[error("VM call failed for transaction {tx}")]
    VmCall {
        tx: Hash,
        #[source]
        source: VmError,
    },

    #[error("No previous root recorded for contract {0}")]
    PrevRootLookupMiss(Address),

    #[error("No staged storage entry for contract transaction {0}")]
    MissingStorageEntry(Hash),

    #[error("Previous root mismatch for contract {addr}: declared {declared}, stored {stored}")]
    PrevRootMismatch {
        addr: Address,
        declared: Hash,
        stored: Hash,
    },

    #[error("Pre-hash quorum insufficient: asked {asked}, heard {heard}")]
    QuorumInsufficient { asked: usize, heard: usize },

    #[error("Fetched block {0} was not persisted in time")]
    SeekBlockNotPersisted(Hash),

    #[error("No qualified peers available")]
    NoQualifiedPeers,

    #[error("Block build failed")]
    BlockBuild(#[from] BlockBuildError),

    #[error("Packager message carries {0} transactions, over the limit")]
    OversizedPackagerMessage(usize),

    #[error("Transaction {tx} spends {count} inputs, over the limit")]
    TooManyInputs { tx: Hash, count: usize },

    #[error("Transaction {tx} has unsupported version {version}")]
    UnsupportedTxVersion { tx: Hash, version: u32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Failures raised while assembling the block itself, before the consensus
/// envelope exists. The numeric sub-code feeds the banded channel below.
#[derive(Debug, Error)]
pub enum CreateBlockError {
    #[error("Missing storage entry or dirty declaration for contract transaction {0}")]
    MissingStorageEntry(Hash),

    #[error("No previous-hash future available for height {0}")]
    PrevHashUnavailable(Height),

    #[error("Previous-hash resolution timed out for height {0}")]
    PrevHashTimeout(Height),

    #[error("Previous-hash future resolved empty for height {0}")]
    PrevHashEmpty(Height),
}

impl CreateBlockError {
    fn sub_code(&self) -> i32 {
        match self {
            CreateBlockError::MissingStorageEntry(_) => 2,
            CreateBlockError::PrevHashUnavailable(_) => 3,
            CreateBlockError::PrevHashTimeout(_) => 4,
            CreateBlockError::PrevHashEmpty(_) => 5,
        }
    }

    /// Prev-hash failures schedule a forced seek for the missing height.
    pub fn triggers_seek(&self) -> bool {
        self.sub_code() >= 3
    }
}

/// Block-build return channel. `code()` reproduces the integer band the
/// operational dashboards key on; the enum is the API.
#[derive(Debug, Error)]
pub enum BlockBuildError {
    #[error("No transactions to build a block from")]
    EmptyInput,

    #[error(transparent)]
    Create(#[from] CreateBlockError),

    #[error("Failed to sign the block message")]
    SignFailure,

    #[error("No VRF attachment recorded for transaction {0}")]
    VrfAttachmentMissing(Hash),

    #[error("No per-transaction VRF attachment recorded for transaction {0}")]
    TxVrfAttachmentMissing(Hash),

    #[error("Consensus rejected the block with code {code}")]
    Consensus { code: i32 },
}

impl BlockBuildError {
    pub fn code(&self) -> i32 {
        match self {
            BlockBuildError::EmptyInput => -1,
            BlockBuildError::Create(inner) => -100 - inner.sub_code(),
            BlockBuildError::SignFailure => -8,
            BlockBuildError::VrfAttachmentMissing(_) => -3000,
            BlockBuildError::TxVrfAttachmentMissing(_) => -4000,
            BlockBuildError::Consensus { code } => code - 4000,
        }
    }
}
