//! Miner reputation for filsync.
//!
//! The [`ReputationEngine`] consolidates three upstream indices (storage power, slashing
//! history, storage asks) and the scores of registered external [`Source`]s into a ranked table
//! of [`MinerScore`]s.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod engine;
mod error;
mod metrics;
pub mod score;
pub mod source;

pub use engine::{Indices, ReputationEngine};
pub use error::{ReputationError, ReputationResult};
pub use score::MinerScore;
pub use source::{Source, SourceStore};
