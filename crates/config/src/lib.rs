//! Standalone crate for filsync configuration types.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub use config::{AskCacheConfig, Config, DealWatcherConfig, ReputationConfig};
