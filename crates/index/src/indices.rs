//! Index snapshot types.

use filsync_primitives::{Address, ChainEpoch, StorageAsk, TokenAmount};
use std::collections::HashMap;

/// Storage power of a miner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MinerPower {
    /// Raw storage power in bytes.
    pub power: u128,
    /// Fraction of the network's total power, in `[0, 1]`.
    pub relative: f64,
}

/// Storage power of every miner known to the chain.
///
/// The set of miners in this index is the set of miners that get a reputation score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerIndex {
    /// Power per miner.
    pub power: HashMap<Address, MinerPower>,
}

/// Slashing history of a miner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slashes {
    /// Epochs the miner was slashed at.
    pub epochs: Vec<ChainEpoch>,
}

/// Slashing history of every miner that was ever slashed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlashingIndex {
    /// Slashes per miner; miners never slashed are absent.
    pub miners: HashMap<Address, Slashes>,
}

impl SlashingIndex {
    /// Returns how many times `miner` was slashed.
    pub fn slash_count(&self, miner: &Address) -> usize {
        self.miners.get(miner).map_or(0, |slashes| slashes.epochs.len())
    }
}

/// Current storage asks and the network median ask price.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskIndex {
    /// Latest ask per miner.
    pub storage: HashMap<Address, StorageAsk>,
    /// Median price of all asks.
    pub storage_median_price: TokenAmount,
}

impl AskIndex {
    /// Builds the index from a set of asks, computing the median price.
    ///
    /// For an even number of asks the median is the lower of the two middle prices.
    pub fn from_asks(asks: impl IntoIterator<Item = StorageAsk>) -> Self {
        let storage =
            asks.into_iter().map(|ask| (ask.miner, ask)).collect::<HashMap<_, _>>();
        let mut prices = storage.values().map(|ask| ask.price).collect::<Vec<_>>();
        prices.sort_unstable();
        let storage_median_price =
            if prices.is_empty() { 0 } else { prices[(prices.len() - 1) / 2] };
        Self { storage, storage_median_price }
    }

    /// Returns `true` if `miner` asks strictly less than the median price.
    pub fn is_below_median(&self, miner: &Address) -> bool {
        self.storage.get(miner).is_some_and(|ask| ask.price < self.storage_median_price)
    }
}
