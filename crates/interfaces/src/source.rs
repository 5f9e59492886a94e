//! The external reputation source capability.

use async_trait::async_trait;
use filsync_primitives::Address;
use multiaddr::Multiaddr;
use std::{collections::HashMap, fmt::Debug};

/// Per-miner scores reported by a reputation source.
pub type SourceScores = HashMap<Address, i64>;

/// Errors returned by a [`SourceClient`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not be reached.
    #[error("reputation source {address} unreachable: {message}")]
    Unreachable {
        /// Address of the source.
        address: Multiaddr,
        /// Transport error.
        message: String,
    },
    /// The source answered with something that isn't a score table.
    #[error("invalid response from reputation source {0}")]
    InvalidResponse(Multiaddr),
}

/// Fetches score tables from independently operated reputation providers.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait SourceClient: Debug + Send + Sync {
    /// Fetches a fresh per-miner score table from the source listening at `address`.
    async fn fetch_scores(&self, address: &Multiaddr) -> Result<SourceScores, SourceError>;
}
