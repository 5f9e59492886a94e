//! Miner indices maintained outside of filsync.
//!
//! The reputation engine reads three indices: storage power, slashing history and storage asks.
//! Each is exposed through an [`IndexSource`], which hands out the latest snapshot and a stream of
//! snapshots published afterwards. [`IndexPublisher`] is an in-process implementation.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::sync::Arc;

mod indices;
mod publisher;

pub use indices::{AskIndex, MinerPower, PowerIndex, Slashes, SlashingIndex};
pub use publisher::{EventStream, IndexPublisher};

/// A source of index snapshots.
#[auto_impl::auto_impl(&, Arc)]
pub trait IndexSource<T>: Send + Sync {
    /// Returns the latest snapshot.
    fn get(&self) -> Arc<T>;

    /// Subscribes to snapshots published from now on.
    fn listen(&self) -> EventStream<Arc<T>>;
}
