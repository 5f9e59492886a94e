//! Registry of external reputation sources.

use crate::{ReputationError, ReputationResult};
use filsync_fetcher::RateLimitedFetcher;
use filsync_interfaces::{Datastore, DatastoreExt, Key, SourceClient, SourceScores};
use filsync_primitives::serde_helper::address_map;
use multiaddr::Multiaddr;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use tracing::{debug, warn};

/// Datastore namespace of registered sources, one entry per source id.
pub const SOURCES_KEY_PREFIX: &str = "/reputation/sources";

/// An external provider of per-miner scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Unique id of the source.
    pub id: String,
    /// Where the source is reached.
    pub address: Multiaddr,
    /// Scores of the last successful refresh.
    #[serde(with = "address_map")]
    pub scores: SourceScores,
    /// How much the source's scores count, in `[0, 1]`.
    pub weight: f64,
    /// Time of the last successful refresh.
    pub last_refresh: Option<SystemTime>,
}

impl Source {
    /// Creates a source that wasn't refreshed yet.
    pub fn new(id: impl Into<String>, address: Multiaddr, weight: f64) -> Self {
        Self { id: id.into(), address, scores: Default::default(), weight, last_refresh: None }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.address)
    }
}

/// Persists sources in a [`Datastore`].
#[derive(Debug)]
pub struct SourceStore<DS> {
    datastore: DS,
    /// Serializes registrations so the duplicate check and the write are atomic.
    add_lock: Mutex<()>,
}

impl<DS: Datastore> SourceStore<DS> {
    /// Creates a store on top of `datastore`.
    pub fn new(datastore: DS) -> Self {
        Self { datastore, add_lock: Mutex::new(()) }
    }

    /// Registers a new source.
    pub fn add(&self, source: Source) -> ReputationResult<()> {
        if source.id.is_empty() || source.id.contains('/') {
            return Err(ReputationError::InvalidSourceId(source.id))
        }
        if !(0.0..=1.0).contains(&source.weight) {
            return Err(ReputationError::InvalidWeight(source.weight))
        }
        let key = source_key(&source.id);
        let _guard = self.add_lock.lock();
        if self.datastore.get(&key)?.is_some() {
            return Err(ReputationError::DuplicateSource(source.id))
        }
        self.datastore.put_json(&key, &source)?;
        debug!(
            target: "reputation::sources",
            source = %source,
            weight = source.weight,
            "registered source"
        );
        Ok(())
    }

    /// Returns the source with the given id.
    pub fn get(&self, id: &str) -> ReputationResult<Option<Source>> {
        Ok(self.datastore.get_json(&source_key(id))?)
    }

    /// Returns every registered source, ordered by id.
    pub fn get_all(&self) -> ReputationResult<Vec<Source>> {
        Ok(self
            .datastore
            .query_json(&Key::new(SOURCES_KEY_PREFIX))?
            .into_iter()
            .map(|(_, source)| source)
            .collect())
    }

    /// Overwrites a source after a refresh.
    pub fn update(&self, source: &Source) -> ReputationResult<()> {
        Ok(self.datastore.put_json(&source_key(&source.id), source)?)
    }

    /// Fetches fresh scores for every source and persists them.
    ///
    /// Sources that fail to refresh or persist are logged and keep their previous scores. Returns
    /// the number of refreshed sources.
    pub async fn refresh_all<SC: SourceClient>(
        &self,
        client: &SC,
        fetcher: &RateLimitedFetcher,
    ) -> ReputationResult<usize> {
        let sources = self.get_all()?;
        let total = sources.len();
        let refreshed = fetcher
            .fetch_all(sources, |mut source| async move {
                source.scores = client.fetch_scores(&source.address).await?;
                source.last_refresh = Some(SystemTime::now());
                Ok::<_, filsync_interfaces::SourceError>(source)
            })
            .await;

        let mut persisted = 0;
        for source in &refreshed {
            match self.update(source) {
                Ok(()) => persisted += 1,
                Err(err) => {
                    warn!(
                        target: "reputation::sources",
                        source = %source,
                        %err,
                        "failed to persist refreshed source"
                    )
                }
            }
        }
        debug!(target: "reputation::sources", total, refreshed = persisted, "refreshed sources");
        Ok(persisted)
    }
}

fn source_key(id: &str) -> Key {
    Key::new(SOURCES_KEY_PREFIX).child(id)
}
