//! Deal proposals and their on-chain lifecycle.

use crate::{
    serde_helper::{address_as_string, cid_as_string},
    Address, TokenAmount,
};
use cid::Cid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states a deal proposal moves through, indexed by the chain's numeric state id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum DealStatus {
    /// The provider doesn't know the deal.
    Unknown = 0,
    /// The provider rejected the proposal.
    Rejected = 1,
    /// The provider accepted the proposal.
    Accepted = 2,
    /// The data was transferred and staged for sealing.
    Staged = 3,
    /// The data is being sealed into a sector.
    Sealing = 4,
    /// The deal failed.
    Failed = 5,
    /// The deal is active on chain.
    Complete = 6,
    /// The provider reported an error.
    Error = 7,
}

impl DealStatus {
    /// All known states, ordered by their chain id.
    pub const ALL: [Self; 8] = [
        Self::Unknown,
        Self::Rejected,
        Self::Accepted,
        Self::Staged,
        Self::Sealing,
        Self::Failed,
        Self::Complete,
        Self::Error,
    ];

    /// Maps a chain state id to its status, `None` for ids this client doesn't know.
    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Returns the chain state id.
    pub const fn id(self) -> u64 {
        self as u64
    }

    /// Returns the canonical name of the state.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "DealUnknown",
            Self::Rejected => "DealRejected",
            Self::Accepted => "DealAccepted",
            Self::Staged => "DealStaged",
            Self::Sealing => "DealSealing",
            Self::Failed => "DealFailed",
            Self::Complete => "DealComplete",
            Self::Error => "DealError",
        }
    }

    /// Returns `true` if the deal can't change state anymore.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Failed | Self::Complete | Self::Error)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deal information as reported by the chain client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealInfo {
    /// The proposal this info belongs to.
    pub proposal_cid: Cid,
    /// Numeric chain state id, see [DealStatus].
    pub state: u64,
    /// Miner storing the data.
    pub provider: Address,
    /// Piece commitment of the stored data.
    pub piece_ref: Vec<u8>,
    /// Padded piece size in bytes.
    pub size: u64,
    /// Agreed price per epoch.
    pub price_per_epoch: TokenAmount,
    /// Deal duration in epochs.
    pub duration: u64,
}

/// The observed state of a tracked deal proposal.
///
/// Two states are the same observation only if every field is equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealState {
    /// The proposal this state belongs to.
    #[serde(with = "cid_as_string")]
    pub proposal_cid: Cid,
    /// Numeric chain state id.
    pub state_id: u64,
    /// Human readable name of [`Self::state_id`].
    pub state_name: String,
    /// Miner storing the data.
    #[serde(with = "address_as_string")]
    pub provider: Address,
    /// Piece commitment of the stored data.
    pub piece_ref: Vec<u8>,
    /// Padded piece size in bytes.
    pub size: u64,
    /// Agreed price per epoch.
    pub price_per_epoch: TokenAmount,
    /// Deal duration in epochs.
    pub duration: u64,
}

impl DealState {
    /// Returns the decoded status, `None` if the state id is unknown to this client.
    pub fn status(&self) -> Option<DealStatus> {
        DealStatus::from_id(self.state_id)
    }
}

impl From<DealInfo> for DealState {
    fn from(info: DealInfo) -> Self {
        let state_name = DealStatus::from_id(info.state)
            .map(|status| status.name().to_string())
            .unwrap_or_else(|| format!("DealState({})", info.state));
        Self {
            proposal_cid: info.proposal_cid,
            state_id: info.state,
            state_name,
            provider: info.provider,
            piece_ref: info.piece_ref,
            size: info.size,
            price_per_epoch: info.price_per_epoch,
            duration: info.duration,
        }
    }
}
