//! A periodically rebuilt cache of miner storage asks.

use crate::{metrics::AskCacheMetrics, DealsResult};
use filsync_config::AskCacheConfig;
use filsync_fetcher::RateLimitedFetcher;
use filsync_interfaces::{ChainClient, ChainError, Datastore, DatastoreExt, Key};
use filsync_primitives::{Address, StorageAsk, TokenAmount};
use filsync_tasks::{ServiceHandle, Shutdown, TaskSpawner, TokioTaskExecutor};
use parking_lot::RwLock;
use std::{fmt, sync::Arc, time::Instant};
use tracing::{debug, info, trace, warn, Instrument, Span};

/// Datastore namespace of persisted asks, one entry per miner.
pub const ASK_KEY_PREFIX: &str = "/deals/storageask";

/// Returns the datastore key of the ask of `miner`.
pub fn ask_key(miner: &Address) -> Key {
    Key::new(ASK_KEY_PREFIX).child(miner)
}

/// A filter over the cached asks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Query {
    /// Only asks at or below this price, any price if `None`.
    pub max_price: Option<TokenAmount>,
    /// Size of the piece to store; asks requiring a larger minimum are skipped.
    pub piece_size: u64,
    /// The maximum number of asks to return.
    pub limit: usize,
    /// Number of matching asks to skip.
    pub offset: usize,
}

/// A snapshot of storage asks, sorted ascending by price.
pub type AskSnapshot = Arc<Vec<StorageAsk>>;

/// Keeps a price sorted snapshot of the storage asks of every miner.
///
/// A background loop rebuilds the snapshot from the chain right after construction and then on
/// every refresh interval. Readers always see a complete snapshot, a rebuild is swapped in at
/// once.
pub struct AskCache<C, DS> {
    inner: Arc<AskCacheInner<C, DS>>,
    service: ServiceHandle,
}

impl<C, DS> AskCache<C, DS>
where
    C: ChainClient + 'static,
    DS: Datastore + 'static,
{
    /// Creates the cache and spawns its refresh loop on the current tokio runtime.
    pub fn new(client: C, datastore: DS, config: AskCacheConfig, span: Span) -> Self {
        Self::with_executor(client, datastore, config, span, &TokioTaskExecutor::default())
    }

    /// Creates the cache and spawns its refresh loop with the given executor.
    ///
    /// The cache starts out with the asks persisted by a previous run, if any.
    pub fn with_executor(
        client: C,
        datastore: DS,
        config: AskCacheConfig,
        span: Span,
        executor: &dyn TaskSpawner,
    ) -> Self {
        let fetcher = RateLimitedFetcher::new(
            "asks",
            config.max_concurrent_queries,
            config.query_timeout,
            config.batch_deadline,
        );
        let initial = span.in_scope(|| load_persisted(&datastore));
        let inner = Arc::new(AskCacheInner {
            client,
            datastore,
            config,
            fetcher,
            snapshot: RwLock::new(Arc::new(initial)),
            metrics: AskCacheMetrics::new(),
        });

        let mut service = ServiceHandle::new("ask cache");
        let this = inner.clone();
        service.spawn(executor, "ask cache refresh", move |shutdown| {
            Box::pin(this.run(shutdown).instrument(span))
        });

        Self { inner, service }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> AskSnapshot {
        self.inner.snapshot.read().clone()
    }

    /// Returns the asks of the current snapshot matching `query`, cheapest first.
    ///
    /// Walks the snapshot in price order and stops at the first ask above `max_price`.
    pub fn available_asks(&self, query: &Query) -> Vec<StorageAsk> {
        let mut asks = Vec::new();
        if query.limit == 0 {
            return asks
        }
        let snapshot = self.snapshot();
        let mut offset = query.offset;
        for ask in snapshot.iter() {
            if query.max_price.is_some_and(|max| ask.price > max) {
                break
            }
            if !ask.accepts_piece(query.piece_size) {
                continue
            }
            if offset > 0 {
                offset -= 1;
                continue
            }
            asks.push(ask.clone());
            if asks.len() == query.limit {
                break
            }
        }
        asks
    }

    /// Stops the refresh loop and waits until it exited.
    ///
    /// A refresh cycle in progress runs to completion first.
    pub async fn close(&self) {
        self.service.close().await
    }
}

impl<C, DS> fmt::Debug for AskCache<C, DS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskCache")
            .field("asks", &self.inner.snapshot.read().len())
            .field("config", &self.inner.config)
            .field("service", &self.service)
            .finish()
    }
}

struct AskCacheInner<C, DS> {
    client: C,
    datastore: DS,
    config: AskCacheConfig,
    fetcher: RateLimitedFetcher,
    snapshot: RwLock<AskSnapshot>,
    metrics: AskCacheMetrics,
}

impl<C, DS> AskCacheInner<C, DS>
where
    C: ChainClient,
    DS: Datastore,
{
    async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        loop {
            if let Err(err) = self.refresh().await {
                warn!(
                    target: "deals::asks",
                    %err,
                    "ask cache refresh failed, keeping previous snapshot"
                );
                self.metrics.inc_failed_cycles();
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.refresh_interval) => {}
            }
        }
        info!(target: "deals::asks", "ask cache stopped");
    }

    /// Fetches the asks of every miner and swaps them in as the new snapshot.
    async fn refresh(&self) -> DealsResult<()> {
        let started = Instant::now();
        let miners =
            tokio::time::timeout(self.config.query_timeout, self.client.list_miners(None))
                .await
                .map_err(|_| ChainError::Timeout("list_miners"))??;
        trace!(target: "deals::asks", miners = miners.len(), "querying asks");

        let client = &self.client;
        let mut asks = self
            .fetcher
            .fetch_all(miners, |miner| async move {
                let peer = client.miner_peer_id(&miner, None).await?;
                client.query_ask(&peer, &miner).await
            })
            .await;
        asks.sort_by_key(|ask| ask.price);

        for ask in &asks {
            self.datastore.put_json(&ask_key(&ask.miner), ask)?;
        }

        let len = asks.len();
        *self.snapshot.write() = Arc::new(asks);
        self.metrics.record_published(len);
        debug!(
            target: "deals::asks",
            asks = len,
            elapsed = ?started.elapsed(),
            "ask cache refreshed"
        );
        Ok(())
    }
}

/// Loads the asks persisted by earlier refreshes, sorted by price.
///
/// Entries that fail to decode are skipped.
fn load_persisted<DS: Datastore>(datastore: &DS) -> Vec<StorageAsk> {
    let entries = match datastore.query_json_entries::<StorageAsk>(&Key::new(ASK_KEY_PREFIX)) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(target: "deals::asks", %err, "failed to load persisted asks, starting empty");
            return Vec::new()
        }
    };

    let mut asks = Vec::with_capacity(entries.len());
    for (key, ask) in entries {
        match ask {
            Ok(ask) => asks.push(ask),
            Err(err) => warn!(target: "deals::asks", %key, %err, "skipping persisted ask"),
        }
    }
    asks.sort_by_key(|ask| ask.price);
    debug!(target: "deals::asks", asks = asks.len(), "loaded persisted asks");
    asks
}
