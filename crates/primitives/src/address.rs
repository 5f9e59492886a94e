//! Miner and peer identifiers.
//!
//! Chain addresses are [`fvm_shared::address::Address`], persisted in their string form through
//! [`crate::serde_helper::address_as_string`].

use serde::{Deserialize, Serialize};
use std::fmt;

pub use fvm_shared::address::Address;

/// The libp2p identity a miner advertises on chain.
///
/// Opaque to filsync, it is only handed back to the chain client when querying asks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wraps the encoded peer id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the encoded peer id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
