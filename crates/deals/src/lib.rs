//! Storage deal services of filsync.
//!
//! - [`AskCache`]: a price sorted snapshot of the storage asks of every miner, refreshed in the
//!   background.
//! - [`DealWatcher`]: streams the state changes of deal proposals, driven by chain head changes.
//! - [`DealModule`]: imports data and starts deals, owning the two services above.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod asks;
mod error;
mod metrics;
mod module;
pub mod watcher;

pub use asks::{AskCache, AskSnapshot, Query};
pub use error::{DealsError, DealsResult};
pub use module::{DealConfig, DealModule, StoreResult};
pub use watcher::DealWatcher;
