#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! The external capabilities filsync consumes: a chain node, a key/value datastore and
//! reputation sources.
//!
//! Services only depend on these traits, concrete clients are provided by the embedder.

/// Chain node access.
pub mod chain;

/// Key/value persistence.
pub mod datastore;

/// External reputation sources.
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
/// Scripted capabilities for tests.
pub mod test_utils;

pub use chain::{ChainClient, ChainError, ChainResult, HeadChangeStream};
pub use datastore::{Datastore, DatastoreError, DatastoreExt, DatastoreResult, Key, MemoryDatastore};
pub use source::{SourceClient, SourceError, SourceScores};
