//! Watches deal proposals and streams their state changes.

use crate::{metrics::DealWatcherMetrics, DealsError, DealsResult};
use filsync_config::DealWatcherConfig;
use filsync_interfaces::{ChainClient, ChainError, HeadChangeStream};
use filsync_primitives::{Cid, DealState};
use filsync_tasks::{Shutdown, TaskSpawner, TokioTaskExecutor};
use futures::StreamExt;
use std::{collections::HashMap, fmt};
use tokio::{
    sync::mpsc::{self, error::SendTimeoutError},
    time::{Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, trace, warn, Instrument, Span};

/// Spawns one task per watch that follows a set of deal proposals.
///
/// A watch refreshes the state of every proposal once after the initial wait and then on every
/// chain head change. Only changed states are sent.
pub struct DealWatcher<C> {
    client: C,
    config: DealWatcherConfig,
    executor: Box<dyn TaskSpawner>,
    span: Span,
    metrics: DealWatcherMetrics,
}

impl<C> DealWatcher<C>
where
    C: ChainClient + Clone + 'static,
{
    /// Creates a watcher that spawns its watches on the current tokio runtime.
    pub fn new(client: C, config: DealWatcherConfig, span: Span) -> Self {
        Self::with_executor(client, config, span, TokioTaskExecutor::default().boxed())
    }

    /// Creates a watcher that spawns its watches with the given executor.
    pub fn with_executor(
        client: C,
        config: DealWatcherConfig,
        span: Span,
        executor: Box<dyn TaskSpawner>,
    ) -> Self {
        Self { client, config, executor, span, metrics: DealWatcherMetrics::new() }
    }

    /// Starts watching `proposals` until `shutdown` fires or the receiver is dropped.
    ///
    /// The returned channel is closed when the watch ends. A state update that can't be
    /// delivered within the configured write timeout is dropped.
    pub async fn watch(
        &self,
        shutdown: Shutdown,
        proposals: Vec<Cid>,
    ) -> DealsResult<mpsc::Receiver<DealState>> {
        if proposals.is_empty() {
            return Err(DealsError::NoProposals)
        }
        let head_changes =
            tokio::time::timeout(self.config.query_timeout, self.client.chain_notify())
                .await
                .map_err(|_| ChainError::Timeout("chain_notify"))??;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let watch = Watch {
            client: self.client.clone(),
            config: self.config,
            proposals,
            last_states: HashMap::new(),
            tx,
            metrics: self.metrics.clone(),
        };
        debug!(
            target: "deals::watcher",
            parent: &self.span,
            proposals = watch.proposals.len(),
            "starting deal watch"
        );
        let fut = watch.run(shutdown, head_changes).instrument(self.span.clone());
        self.executor.spawn_task(Box::pin(fut));
        Ok(rx)
    }
}

impl<C> fmt::Debug for DealWatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DealWatcher")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// State of a single watch.
struct Watch<C> {
    client: C,
    config: DealWatcherConfig,
    proposals: Vec<Cid>,
    last_states: HashMap<Cid, DealState>,
    tx: mpsc::Sender<DealState>,
    metrics: DealWatcherMetrics,
}

impl<C: ChainClient> Watch<C> {
    async fn run(mut self, mut shutdown: Shutdown, mut head_changes: HeadChangeStream) {
        self.metrics.inc_watches();
        let initial_wait = tokio::time::sleep(self.config.initial_wait);
        tokio::pin!(initial_wait);
        let mut waiting = true;
        let mut listening = true;
        let mut fallback = self.config.fallback_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = &mut initial_wait, if waiting => {
                    waiting = false;
                }
                changes = head_changes.next(), if listening => match changes {
                    Some(changes) => {
                        trace!(target: "deals::watcher", changes = changes.len(), "head changed");
                    }
                    None => {
                        listening = false;
                        if waiting || fallback.is_some() {
                            warn!(target: "deals::watcher", "head change stream ended");
                            continue
                        }
                        warn!(target: "deals::watcher", "head change stream ended, stopping watch");
                        break
                    }
                },
                _ = tick(&mut fallback) => {}
            }
            if !self.refresh(&mut shutdown).await {
                break
            }
            if !waiting && !listening && fallback.is_none() {
                debug!(target: "deals::watcher", "no refresh trigger left, stopping watch");
                break
            }
        }

        self.metrics.dec_watches();
        debug!(target: "deals::watcher", "deal watch ended");
    }

    /// Fetches the state of every proposal and sends the changed ones.
    ///
    /// Returns `false` if the watch must end.
    async fn refresh(&mut self, shutdown: &mut Shutdown) -> bool {
        for proposal in &self.proposals {
            let query =
                tokio::time::timeout(self.config.query_timeout, self.client.deal_info(proposal));
            let info = tokio::select! {
                biased;
                _ = &mut *shutdown => return false,
                info = query => info,
            };
            let state = match info {
                Ok(Ok(info)) => DealState::from(info),
                Ok(Err(err)) => {
                    warn!(target: "deals::watcher", %proposal, %err, "failed to get deal info");
                    self.metrics.inc_failed_queries();
                    continue
                }
                Err(_) => {
                    warn!(target: "deals::watcher", %proposal, "deal info query timed out");
                    self.metrics.inc_failed_queries();
                    continue
                }
            };

            if self.last_states.get(proposal) == Some(&state) {
                continue
            }
            trace!(
                target: "deals::watcher",
                %proposal,
                state = %state.state_name,
                "deal state changed"
            );
            self.last_states.insert(*proposal, state.clone());

            let sent = tokio::select! {
                biased;
                _ = &mut *shutdown => return false,
                sent = self.tx.send_timeout(state, self.config.channel_write_timeout) => sent,
            };
            match sent {
                Ok(()) => self.metrics.inc_updates(),
                Err(SendTimeoutError::Timeout(state)) => {
                    warn!(
                        target: "deals::watcher",
                        %proposal,
                        state = %state.state_name,
                        "dropping deal state update, channel is blocked"
                    );
                    self.metrics.inc_dropped_updates();
                }
                Err(SendTimeoutError::Closed(_)) => {
                    debug!(target: "deals::watcher", "watch receiver dropped");
                    return false
                }
            }
        }
        true
    }
}

/// Waits for the next tick of `interval`, forever if there is none.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}
