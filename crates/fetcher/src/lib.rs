//! Bounded-concurrency, best-effort fan-out of remote queries.
//!
//! A [`RateLimitedFetcher`] runs one fetch per key with at most `max_concurrent` fetches in
//! flight. Each fetch is bounded by its own timeout and the whole batch by a deadline. Failed,
//! timed out and abandoned fetches are logged and left out of the result, they never fail the
//! batch.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use crate::metrics::FetcherMetrics;
use futures::{stream, Future, StreamExt};
use std::{fmt, time::Duration};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

mod metrics;

/// Runs batches of fallible fetches with bounded concurrency.
#[derive(Clone)]
pub struct RateLimitedFetcher {
    max_concurrent: usize,
    fetch_timeout: Duration,
    batch_deadline: Duration,
    metrics: FetcherMetrics,
}

impl RateLimitedFetcher {
    /// Creates a fetcher.
    ///
    /// `scope` labels the fetcher's metrics, e.g. `asks`. A `max_concurrent` of zero is treated as
    /// one.
    pub fn new(
        scope: &'static str,
        max_concurrent: usize,
        fetch_timeout: Duration,
        batch_deadline: Duration,
    ) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            fetch_timeout,
            batch_deadline,
            metrics: FetcherMetrics::new(scope),
        }
    }

    /// Returns the maximum number of fetches in flight.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Fetches every key and returns the successful values, in key order.
    ///
    /// Returns once every fetch has completed, failed or timed out, or once the batch deadline
    /// passed. Fetches still in flight at the deadline are dropped.
    pub async fn fetch_all<K, V, E, F, Fut>(
        &self,
        keys: impl IntoIterator<Item = K>,
        mut fetch: F,
    ) -> Vec<V>
    where
        K: fmt::Display,
        E: fmt::Display,
        F: FnMut(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let deadline = Instant::now() + self.batch_deadline;
        let fetch_timeout = self.fetch_timeout;
        let keys = keys.into_iter().collect::<Vec<_>>();
        let total = keys.len();

        let mut pending = stream::iter(keys.into_iter().enumerate())
            .map(|(index, key)| {
                let label = key.to_string();
                let fut = fetch(key);
                async move { (index, label, tokio::time::timeout(fetch_timeout, fut).await) }
            })
            .buffer_unordered(self.max_concurrent);

        let mut fetched = Vec::with_capacity(total);
        let mut completed = 0;
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((index, key, outcome))) => {
                    completed += 1;
                    match outcome {
                        Ok(Ok(value)) => {
                            trace!(target: "fetcher", %key, "fetched");
                            self.metrics.inc_succeeded();
                            fetched.push((index, value));
                        }
                        Ok(Err(err)) => {
                            debug!(target: "fetcher", %key, %err, "fetch failed");
                            self.metrics.inc_failed();
                        }
                        Err(_) => {
                            debug!(
                                target: "fetcher",
                                %key,
                                timeout = ?fetch_timeout,
                                "fetch timed out"
                            );
                            self.metrics.inc_timed_out();
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    let abandoned = total - completed;
                    warn!(
                        target: "fetcher",
                        abandoned,
                        total,
                        "batch deadline reached, abandoning fetches"
                    );
                    self.metrics.inc_abandoned(abandoned);
                    break
                }
            }
        }

        fetched.sort_unstable_by_key(|(index, _)| *index);
        fetched.into_iter().map(|(_, value)| value).collect()
    }
}

impl fmt::Debug for RateLimitedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedFetcher")
            .field("max_concurrent", &self.max_concurrent)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("batch_deadline", &self.batch_deadline)
            .finish_non_exhaustive()
    }
}
