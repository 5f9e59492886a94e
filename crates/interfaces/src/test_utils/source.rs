//! Testing support for reputation sources.

use crate::source::{SourceClient, SourceError, SourceScores};
use async_trait::async_trait;
use filsync_primitives::Address;
use multiaddr::Multiaddr;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

/// A [`SourceClient`] serving fixed score tables per source address.
#[derive(Debug, Default)]
pub struct TestSourceClient {
    tables: Mutex<HashMap<Multiaddr, SourceScores>>,
    unreachable: Mutex<HashSet<Multiaddr>>,
    fetches: AtomicUsize,
}

impl TestSourceClient {
    /// Sets the scores the source at `address` answers with.
    pub fn set_scores(
        &self,
        address: Multiaddr,
        scores: impl IntoIterator<Item = (Address, i64)>,
    ) {
        self.tables.lock().insert(address, scores.into_iter().collect());
    }

    /// Makes the source at `address` unreachable (or reachable again).
    pub fn set_unreachable(&self, address: Multiaddr, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(address);
        } else {
            set.remove(&address);
        }
    }

    /// Returns the number of fetches, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for TestSourceClient {
    async fn fetch_scores(&self, address: &Multiaddr) -> Result<SourceScores, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().contains(address) {
            return Err(SourceError::Unreachable {
                address: address.clone(),
                message: "connection refused".to_string(),
            })
        }
        self.tables
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| SourceError::InvalidResponse(address.clone()))
    }
}
