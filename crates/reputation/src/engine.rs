//! The reputation engine.

use crate::{
    metrics::ReputationMetrics,
    score::{rank_miners, MinerScore},
    source::{Source, SourceStore},
    ReputationError, ReputationResult,
};
use filsync_config::ReputationConfig;
use filsync_fetcher::RateLimitedFetcher;
use filsync_index::{AskIndex, EventStream, IndexSource, PowerIndex, SlashingIndex};
use filsync_interfaces::{Datastore, SourceClient};
use filsync_tasks::{ServiceHandle, Shutdown, TaskSpawner, TokioTaskExecutor};
use futures::StreamExt;
use multiaddr::Multiaddr;
use parking_lot::{Mutex, RwLock};
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn, Instrument, Span};

/// The upstream indices the engine subscribes to.
#[derive(Clone, Copy)]
pub struct Indices<'a> {
    /// Storage power index, decides which miners are ranked.
    pub power: &'a dyn IndexSource<PowerIndex>,
    /// Slashing history index.
    pub slashing: &'a dyn IndexSource<SlashingIndex>,
    /// Storage ask index.
    pub asks: &'a dyn IndexSource<AskIndex>,
}

impl fmt::Debug for Indices<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indices").finish_non_exhaustive()
    }
}

/// The latest snapshot of every index, updated together.
#[derive(Debug, Clone)]
struct IndexSnapshots {
    power: Arc<PowerIndex>,
    slashing: Arc<SlashingIndex>,
    asks: Arc<AskIndex>,
}

/// Ranks miners by a weighted score of their power, slashing history, ask price and the scores
/// of external sources.
///
/// The score table is rebuilt from scratch whenever an index publishes a new snapshot or the
/// sources were refreshed. Rebuild requests arriving while one is pending are folded into it.
pub struct ReputationEngine<DS, SC> {
    inner: Arc<EngineInner<DS, SC>>,
    service: ServiceHandle,
}

impl<DS, SC> ReputationEngine<DS, SC>
where
    DS: Datastore + 'static,
    SC: SourceClient + 'static,
{
    /// Creates the engine and spawns its loops on the current tokio runtime.
    pub fn new(
        datastore: DS,
        source_client: SC,
        indices: Indices<'_>,
        config: ReputationConfig,
        span: Span,
    ) -> Self {
        Self::with_executor(
            datastore,
            source_client,
            indices,
            config,
            span,
            &TokioTaskExecutor::default(),
        )
    }

    /// Creates the engine and spawns its loops with the given executor.
    ///
    /// The first score table is built from the indices' current snapshots.
    pub fn with_executor(
        datastore: DS,
        source_client: SC,
        indices: Indices<'_>,
        config: ReputationConfig,
        span: Span,
        executor: &dyn TaskSpawner,
    ) -> Self {
        let (rebuild_tx, rebuild_rx) = mpsc::channel(1);
        let inner = Arc::new(EngineInner {
            sources: SourceStore::new(datastore),
            source_client,
            config,
            fetcher: RateLimitedFetcher::new(
                "reputation_sources",
                config.max_concurrent_sources,
                config.source_fetch_timeout,
                config.source_batch_deadline,
            ),
            indices: Mutex::new(IndexSnapshots {
                power: indices.power.get(),
                slashing: indices.slashing.get(),
                asks: indices.asks.get(),
            }),
            scores: RwLock::new(Arc::new(Vec::new())),
            rebuild_tx,
            rebuilds: AtomicUsize::new(0),
            index_updates: AtomicUsize::new(0),
            metrics: ReputationMetrics::new(),
        });
        inner.request_rebuild();

        let mut service = ServiceHandle::new("reputation engine");
        let (power, slashing, asks) =
            (indices.power.listen(), indices.slashing.listen(), indices.asks.listen());
        let this = inner.clone();
        let task_span = span.clone();
        service.spawn(executor, "reputation index subscription", move |shutdown| {
            Box::pin(this.subscribe_indices(shutdown, power, slashing, asks).instrument(task_span))
        });
        let this = inner.clone();
        let task_span = span.clone();
        service.spawn(executor, "reputation rebuild", move |shutdown| {
            Box::pin(this.rebuild_loop(shutdown, rebuild_rx).instrument(task_span))
        });
        let this = inner.clone();
        service.spawn(executor, "reputation source refresh", move |shutdown| {
            Box::pin(this.refresh_sources_loop(shutdown).instrument(span))
        });

        Self { inner, service }
    }

    /// Registers an external source with the configured default weight.
    pub fn add_source(&self, id: impl Into<String>, address: Multiaddr) -> ReputationResult<()> {
        self.add_source_with_weight(id, address, self.inner.config.default_source_weight)
    }

    /// Registers an external source with the given weight in `[0, 1]`.
    ///
    /// The source's scores are fetched with the next source refresh.
    pub fn add_source_with_weight(
        &self,
        id: impl Into<String>,
        address: Multiaddr,
        weight: f64,
    ) -> ReputationResult<()> {
        self.inner.sources.add(Source::new(id, address, weight))
    }

    /// Returns all registered sources.
    pub fn sources(&self) -> ReputationResult<Vec<Source>> {
        self.inner.sources.get_all()
    }

    /// Returns the `n` best ranked miners, best first.
    ///
    /// Fails if fewer than `n` miners are ranked, see [`Self::miner_count`].
    pub fn get_top_miners(&self, n: usize) -> ReputationResult<Vec<MinerScore>> {
        let scores = self.inner.scores.read();
        if n > scores.len() {
            return Err(ReputationError::NotEnoughMiners { requested: n, available: scores.len() })
        }
        Ok(scores[..n].to_vec())
    }

    /// Returns the number of ranked miners.
    pub fn miner_count(&self) -> usize {
        self.inner.scores.read().len()
    }

    /// Returns the number of completed score table rebuilds.
    pub fn rebuild_count(&self) -> usize {
        self.inner.rebuilds.load(Ordering::SeqCst)
    }

    /// Returns the number of index snapshots received since the engine started.
    pub fn index_update_count(&self) -> usize {
        self.inner.index_updates.load(Ordering::SeqCst)
    }

    /// Stops all loops of the engine.
    ///
    /// Returns immediately, a rebuild in progress finishes in the background.
    pub fn close(&self) {
        self.service.fire()
    }
}

impl<DS, SC> fmt::Debug for ReputationEngine<DS, SC> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReputationEngine")
            .field("miners", &self.inner.scores.read().len())
            .field("config", &self.inner.config)
            .field("service", &self.service)
            .finish()
    }
}

struct EngineInner<DS, SC> {
    sources: SourceStore<DS>,
    source_client: SC,
    config: ReputationConfig,
    fetcher: RateLimitedFetcher,
    indices: Mutex<IndexSnapshots>,
    scores: RwLock<Arc<Vec<MinerScore>>>,
    rebuild_tx: mpsc::Sender<()>,
    rebuilds: AtomicUsize,
    index_updates: AtomicUsize,
    metrics: ReputationMetrics,
}

impl<DS, SC> EngineInner<DS, SC>
where
    DS: Datastore,
    SC: SourceClient,
{
    /// Asks the rebuild loop for a new score table, unless a request is already pending.
    fn request_rebuild(&self) {
        match self.rebuild_tx.try_send(()) {
            Ok(()) => trace!(target: "reputation", "requested rebuild"),
            Err(TrySendError::Full(())) => self.metrics.inc_coalesced_requests(),
            Err(TrySendError::Closed(())) => {}
        }
    }

    async fn subscribe_indices(
        self: Arc<Self>,
        mut shutdown: Shutdown,
        mut power: EventStream<Arc<PowerIndex>>,
        mut slashing: EventStream<Arc<SlashingIndex>>,
        mut asks: EventStream<Arc<AskIndex>>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(index) = power.next() => {
                    self.indices.lock().power = index;
                }
                Some(index) = slashing.next() => {
                    self.indices.lock().slashing = index;
                }
                Some(index) = asks.next() => {
                    self.indices.lock().asks = index;
                }
            }
            self.index_updates.fetch_add(1, Ordering::SeqCst);
            self.request_rebuild();
        }
        info!(target: "reputation", "terminating index subscription");
    }

    async fn rebuild_loop(
        self: Arc<Self>,
        mut shutdown: Shutdown,
        mut requests: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                request = requests.recv() => {
                    if request.is_none() {
                        break
                    }
                }
            }
            if let Err(err) = self.rebuild() {
                warn!(target: "reputation", %err, "failed to rebuild score table");
                self.metrics.inc_failed_rebuilds();
            }
        }
        info!(target: "reputation", "terminating score rebuilds");
    }

    /// Recomputes the score table and swaps it in.
    fn rebuild(&self) -> ReputationResult<()> {
        let started = Instant::now();
        let sources = self.sources.get_all()?;
        let indices = self.indices.lock().clone();

        let scores = rank_miners(&indices.power, &indices.slashing, &indices.asks, &sources);
        let miners = scores.len();
        *self.scores.write() = Arc::new(scores);

        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        self.metrics.record_rebuild(miners);
        debug!(target: "reputation", miners, elapsed = ?started.elapsed(), "score table rebuilt");
        Ok(())
    }

    async fn refresh_sources_loop(self: Arc<Self>, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.source_refresh_interval) => {}
            }
            let refresh = self.sources.refresh_all(&self.source_client, &self.fetcher);
            let refreshed = tokio::select! {
                _ = &mut shutdown => break,
                refreshed = refresh => refreshed,
            };
            match refreshed {
                Ok(0) => {}
                Ok(_) => self.request_rebuild(),
                Err(err) => {
                    warn!(target: "reputation::sources", %err, "failed to refresh sources");
                    self.metrics.inc_failed_source_refreshes();
                }
            }
        }
        info!(target: "reputation::sources", "terminating source refresh");
    }
}
