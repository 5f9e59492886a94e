//! Commonly used types in filsync.
//!
//! Everything here is plain data exchanged between the chain client, the persistence layer and
//! the synchronization services.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod address;
mod ask;
mod deal;
pub mod serde_helper;

pub use address::{Address, PeerId};
pub use ask::StorageAsk;
pub use cid::Cid;
pub use deal::{DealInfo, DealState, DealStatus};
pub use fvm_shared::clock::ChainEpoch;

/// An amount of the native token, in its smallest unit (attoFIL).
pub type TokenAmount = u128;

/// How a tipset entered or left the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadChangeKind {
    /// The current head, sent once when subscribing.
    Current,
    /// A tipset was applied.
    Apply,
    /// A tipset was reverted.
    Revert,
}

/// A single chain head change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadChange {
    /// The kind of change.
    pub kind: HeadChangeKind,
    /// Height of the affected tipset.
    pub height: ChainEpoch,
}

impl HeadChange {
    /// Creates an [HeadChangeKind::Apply] notification for the given height.
    pub const fn apply(height: ChainEpoch) -> Self {
        Self { kind: HeadChangeKind::Apply, height }
    }
}
