// Peer-set view used for elections and quorum sampling.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crest_common::{block::Height, crypto::Address};

use crate::core::{error::BlockchainError, storage::Storage};

#[async_trait]
pub trait PeerProvider: Send + Sync + 'static {
    /// The staked and invested peer set as seen at `height`. This is the
    /// node set VRF elections and pre-hash quorums draw from.
    async fn qualified_peers(&self, height: Height) -> Result<Vec<Address>, BlockchainError>;
}

/// Default provider: staked addresses from the store, filtered down to the
/// ones that also hold the required investment.
pub struct StakePeerProvider<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> StakePeerProvider<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: Storage> PeerProvider for StakePeerProvider<S> {
    async fn qualified_peers(&self, _height: Height) -> Result<Vec<Address>, BlockchainError> {
        let mut qualified = Vec::new();
        for addr in self.storage.get_stake_addresses().await? {
            if self.storage.is_invested(&addr).await? {
                qualified.push(addr);
            } else if log::log_enabled!(log::Level::Debug) {
                debug!("{} is staked but not invested, skipping", addr);
            }
        }
        Ok(qualified)
    }
}
