//! The chain client capability.

use async_trait::async_trait;
use filsync_primitives::{
    Address, ChainEpoch, Cid, DealInfo, HeadChange, PeerId, StorageAsk, TokenAmount,
};
use futures::stream::BoxStream;
use std::{fmt::Debug, path::Path};

/// Result alias for [`ChainError`].
pub type ChainResult<T> = Result<T, ChainError>;

/// A stream of chain head changes, each item is the batch of changes of one notification.
pub type HeadChangeStream = BoxStream<'static, Vec<HeadChange>>;

/// Errors returned by a [`ChainClient`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The remote call failed.
    #[error("chain call {method} failed: {message}")]
    Rpc {
        /// The remote method that failed.
        method: &'static str,
        /// The error reported by the node.
        message: String,
    },
    /// The remote call did not answer in time.
    #[error("chain call {0} timed out")]
    Timeout(&'static str),
    /// The requested object doesn't exist.
    #[error("{0} not found")]
    NotFound(String),
}

impl ChainError {
    /// Creates a [`ChainError::Rpc`] error.
    pub fn rpc(method: &'static str, message: impl Into<String>) -> Self {
        Self::Rpc { method, message: message.into() }
    }
}

/// Access to a chain node.
///
/// This is the only way filsync talks to the network; every call may be slow or fail, and
/// callers bound each call with their own timeout.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait ChainClient: Debug + Send + Sync {
    /// Lists all miner addresses at the given height, or at the current head if `None`.
    async fn list_miners(&self, height: Option<ChainEpoch>) -> ChainResult<Vec<Address>>;

    /// Resolves a miner to the peer id it advertises.
    async fn miner_peer_id(
        &self,
        miner: &Address,
        height: Option<ChainEpoch>,
    ) -> ChainResult<PeerId>;

    /// Queries the current storage ask of a miner.
    async fn query_ask(&self, peer: &PeerId, miner: &Address) -> ChainResult<StorageAsk>;

    /// Fetches the current information of a deal proposal.
    async fn deal_info(&self, proposal: &Cid) -> ChainResult<DealInfo>;

    /// Starts a storage deal for already imported data and returns the proposal cid.
    async fn start_deal(
        &self,
        data: &Cid,
        client: &Address,
        miner: &Address,
        epoch_price: TokenAmount,
        duration: u64,
    ) -> ChainResult<Cid>;

    /// Imports the file at `path` into the node and returns the cid of its root.
    async fn import(&self, path: &Path) -> ChainResult<Cid>;

    /// Subscribes to chain head changes.
    async fn chain_notify(&self) -> ChainResult<HeadChangeStream>;
}
