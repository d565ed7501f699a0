// Block persistence collaborator.
//
// Owns committed blocks and the machinery that chases missing ones. The
// core consumes previous-hash futures when sealing and hands fetched
// divergent blocks back through the seek pipeline.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crest_common::{
    block::{Block, Height},
    crypto::Hash,
};

#[async_trait]
pub trait BlockStorage: Send + Sync + 'static {
    /// One-shot future resolving to the hash of the block at `height`.
    /// `None` means no future can be produced for that height at all.
    fn prev_hash_receiver(&self, height: Height) -> Option<oneshot::Receiver<Option<Hash>>>;

    /// Ask the seek pipeline to fetch the chain state at `height`.
    async fn commit_seek_task(&self, height: Height);

    /// Like `commit_seek_task` but drops any cached result first; used after
    /// a previous-hash resolution failure.
    async fn force_commit_seek(&self, height: Height);

    /// Hand a block fetched from a peer to the persistence pipeline.
    async fn add_seek_block(&self, block: Block);

    /// Whether a block is durably stored.
    async fn is_block_stored(&self, hash: &Hash) -> bool;
}
