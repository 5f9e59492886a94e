//! Miner score computation.

use crate::source::Source;
use filsync_index::{AskIndex, PowerIndex, SlashingIndex};
use filsync_primitives::{serde_helper::address_as_string, Address};
use serde::{Deserialize, Serialize};

/// Weight of the slashing history.
const SLASHING_WEIGHT: f64 = 50.0;
/// Weight of the relative storage power.
const POWER_WEIGHT: f64 = 20.0;
/// Weight of the external source scores.
const EXTERNAL_WEIGHT: f64 = 20.0;
/// Weight of the ask price competitiveness.
const ASK_WEIGHT: f64 = 10.0;

/// The reputation score of a miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerScore {
    /// The miner.
    #[serde(with = "address_as_string")]
    pub addr: Address,
    /// Higher is better.
    pub score: i64,
}

/// Computes the score of `miner`.
///
/// `50 * slash_penalty + 20 * power_fraction + 20 * external + 10 * ask_competitiveness`,
/// truncated toward zero, where
/// - `slash_penalty` halves with every slash, `1` for a miner never slashed,
/// - `external` is the sum of every source's score of the miner times the source weight,
/// - `ask_competitiveness` is `1` if the miner asks less than the median price, else `0`.
pub fn calculate_score(
    miner: &Address,
    power: &PowerIndex,
    slashing: &SlashingIndex,
    asks: &AskIndex,
    sources: &[Source],
) -> MinerScore {
    let power_score = power.power.get(miner).map_or(0.0, |power| power.relative);

    let slashes = i32::try_from(slashing.slash_count(miner)).unwrap_or(i32::MAX);
    let slash_score = 1.0 / 2f64.powi(slashes);

    let external_score = sources
        .iter()
        .filter_map(|source| source.scores.get(miner).map(|score| source.weight * *score as f64))
        .sum::<f64>();

    let ask_score = if asks.is_below_median(miner) { 1.0 } else { 0.0 };

    let score = SLASHING_WEIGHT * slash_score +
        POWER_WEIGHT * power_score +
        EXTERNAL_WEIGHT * external_score +
        ASK_WEIGHT * ask_score;
    MinerScore { addr: *miner, score: score as i64 }
}

/// Scores every miner of the power index, best first.
///
/// Equal scores are ordered by address.
pub fn rank_miners(
    power: &PowerIndex,
    slashing: &SlashingIndex,
    asks: &AskIndex,
    sources: &[Source],
) -> Vec<MinerScore> {
    let mut scores = power
        .power
        .keys()
        .map(|miner| calculate_score(miner, power, slashing, asks, sources))
        .collect::<Vec<_>>();
    scores.sort_unstable_by(|a, b| b.score.cmp(&a.score).then_with(|| a.addr.cmp(&b.addr)));
    scores
}
