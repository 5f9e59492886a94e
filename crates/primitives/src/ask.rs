//! Storage asks advertised by miners.

use crate::{serde_helper::address_as_string, Address, TokenAmount};
use serde::{Deserialize, Serialize};

/// A miner's advertised price and minimum piece size for storage deals.
///
/// Immutable once placed into an ask snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAsk {
    /// Miner that placed the ask.
    #[serde(with = "address_as_string")]
    pub miner: Address,
    /// Price per GiB per epoch, in the smallest currency unit.
    pub price: TokenAmount,
    /// Smallest piece, in bytes, the miner accepts.
    pub min_piece_size: u64,
    /// Epoch the ask was placed at.
    pub timestamp: u64,
    /// Epoch the ask expires at.
    pub expiry: u64,
}

impl StorageAsk {
    /// Returns `true` if a piece of `piece_size` bytes satisfies the ask's minimum.
    pub const fn accepts_piece(&self, piece_size: u64) -> bool {
        self.min_piece_size <= piece_size
    }
}
