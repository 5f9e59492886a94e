//! Deal making on top of the ask cache and the deal watcher.

use crate::{
    asks::{AskCache, Query},
    watcher::DealWatcher,
    DealsResult,
};
use filsync_config::{AskCacheConfig, DealWatcherConfig};
use filsync_interfaces::{ChainClient, ChainError, Datastore};
use filsync_primitives::{Address, Cid, DealState, StorageAsk, TokenAmount};
use filsync_tasks::{Shutdown, TaskSpawner, TokioTaskExecutor};
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, warn, Span};

/// Miner and price of a deal to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealConfig {
    /// Miner to store the data with.
    pub miner: Address,
    /// Offered price per epoch.
    pub epoch_price: TokenAmount,
}

/// Outcome of [`DealModule::store`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreResult {
    /// Proposals of the deals that were started.
    pub proposals: Vec<Cid>,
    /// Deals that could not be started.
    pub failed: Vec<DealConfig>,
}

/// Makes and follows storage deals.
///
/// Owns the [`AskCache`] and a [`DealWatcher`] sharing the same chain client.
#[derive(Debug)]
pub struct DealModule<C, DS> {
    client: Arc<C>,
    asks: AskCache<Arc<C>, Arc<DS>>,
    watcher: DealWatcher<Arc<C>>,
    query_timeout: std::time::Duration,
}

impl<C, DS> DealModule<C, DS>
where
    C: ChainClient + 'static,
    DS: Datastore + 'static,
{
    /// Creates the module and starts its ask cache on the current tokio runtime.
    pub fn new(
        client: C,
        datastore: DS,
        asks: AskCacheConfig,
        deals: DealWatcherConfig,
        span: Span,
    ) -> Self {
        let executor = TokioTaskExecutor::default().boxed();
        Self::with_executor(client, datastore, asks, deals, span, executor)
    }

    /// Creates the module, spawning all of its tasks with `executor`.
    pub fn with_executor(
        client: C,
        datastore: DS,
        asks: AskCacheConfig,
        deals: DealWatcherConfig,
        span: Span,
        executor: Box<dyn TaskSpawner>,
    ) -> Self {
        let client = Arc::new(client);
        let ask_cache = AskCache::with_executor(
            client.clone(),
            Arc::new(datastore),
            asks,
            span.clone(),
            &*executor,
        );
        let watcher = DealWatcher::with_executor(client.clone(), deals, span, executor);
        Self { client, asks: ask_cache, watcher, query_timeout: deals.query_timeout }
    }

    /// Imports `data` and starts a deal for it with every configured miner.
    ///
    /// The data is spooled to a temporary file first, which is removed once imported. A deal that
    /// fails to start is reported in [`StoreResult::failed`] and doesn't affect the others.
    pub async fn store<R>(
        &self,
        client_addr: &Address,
        mut data: R,
        deal_configs: &[DealConfig],
        duration: u64,
    ) -> DealsResult<StoreResult>
    where
        R: AsyncRead + Unpin,
    {
        let spool = tempfile::Builder::new().prefix("import-").tempfile()?;
        let mut file = tokio::fs::File::from_std(spool.reopen()?);
        let written = tokio::io::copy(&mut data, &mut file).await?;
        file.flush().await?;
        drop(file);
        debug!(target: "deals", bytes = written, path = ?spool.path(), "spooled data for import");

        let data_cid = self.client.import(spool.path()).await?;
        spool.close()?;

        let mut result = StoreResult::default();
        for config in deal_configs {
            match self
                .client
                .start_deal(&data_cid, client_addr, &config.miner, config.epoch_price, duration)
                .await
            {
                Ok(proposal) => {
                    debug!(target: "deals", miner = %config.miner, %proposal, "started deal");
                    result.proposals.push(proposal);
                }
                Err(err) => {
                    warn!(target: "deals", miner = %config.miner, %err, "failed to start deal");
                    result.failed.push(config.clone());
                }
            }
        }
        Ok(result)
    }

    /// Returns the current state of a deal proposal.
    pub async fn info(&self, proposal: &Cid) -> DealsResult<DealState> {
        let info = tokio::time::timeout(self.query_timeout, self.client.deal_info(proposal))
            .await
            .map_err(|_| ChainError::Timeout("deal_info"))??;
        Ok(info.into())
    }

    /// Follows the given proposals, see [`DealWatcher::watch`].
    pub async fn watch(
        &self,
        shutdown: Shutdown,
        proposals: Vec<Cid>,
    ) -> DealsResult<mpsc::Receiver<DealState>> {
        self.watcher.watch(shutdown, proposals).await
    }

    /// Queries the cached asks, see [`AskCache::available_asks`].
    pub fn available_asks(&self, query: &Query) -> Vec<StorageAsk> {
        self.asks.available_asks(query)
    }

    /// Returns the ask cache.
    pub fn ask_cache(&self) -> &AskCache<Arc<C>, Arc<DS>> {
        &self.asks
    }

    /// Stops the ask cache and waits for it to exit.
    ///
    /// Running watches are stopped through the [`Shutdown`] they were started with.
    pub async fn close(&self) {
        self.asks.close().await
    }
}
