//! Scripted implementations of the capabilities, for tests.

mod chain;
mod datastore;
mod source;

pub use chain::{test_address, test_ask, test_cid, StartedDeal, TestChainClient};
pub use datastore::TestDatastore;
pub use source::TestSourceClient;
