// Read-only view of the on-disk key-value store.
//
// The core only ever reads during a round; writes happen on the consensus
// commit path, which is not part of this crate.

use async_trait::async_trait;

use crest_common::{
    block::{Block, Height},
    crypto::{Address, Hash},
};

use crate::core::error::BlockchainError;

#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Height of the highest committed block.
    async fn get_block_top(&self) -> Result<Height, BlockchainError>;

    /// Every address with an active stake.
    async fn get_stake_addresses(&self) -> Result<Vec<Address>, BlockchainError>;

    async fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, BlockchainError>;

    async fn get_block_hash_by_transaction_hash(
        &self,
        tx_hash: &Hash,
    ) -> Result<Option<Hash>, BlockchainError>;

    /// Latest root edge for a contract address: the hash of the last
    /// committed transaction that touched it.
    async fn get_latest_utxo_by_contract_addr(
        &self,
        addr: &Address,
    ) -> Result<Option<Hash>, BlockchainError>;

    /// Whether a staked address also holds the required investment.
    async fn is_invested(&self, addr: &Address) -> Result<bool, BlockchainError>;
}
