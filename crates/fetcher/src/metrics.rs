//! Fetcher metrics.

use metrics::{register_counter, Counter};

/// Outcomes of the fetches of one [`RateLimitedFetcher`](crate::RateLimitedFetcher).
#[derive(Clone)]
pub(crate) struct FetcherMetrics {
    /// Number of successful fetches
    succeeded: Counter,
    /// Number of fetches that returned an error
    failed: Counter,
    /// Number of fetches that exceeded their own timeout
    timed_out: Counter,
    /// Number of fetches abandoned because the batch deadline passed
    abandoned: Counter,
}

impl FetcherMetrics {
    pub(crate) fn new(scope: &'static str) -> Self {
        Self {
            succeeded: register_counter!("fetcher.succeeded", "scope" => scope),
            failed: register_counter!("fetcher.failed", "scope" => scope),
            timed_out: register_counter!("fetcher.timed_out", "scope" => scope),
            abandoned: register_counter!("fetcher.abandoned", "scope" => scope),
        }
    }

    pub(crate) fn inc_succeeded(&self) {
        self.succeeded.increment(1);
    }

    pub(crate) fn inc_failed(&self) {
        self.failed.increment(1);
    }

    pub(crate) fn inc_timed_out(&self) {
        self.timed_out.increment(1);
    }

    pub(crate) fn inc_abandoned(&self, count: usize) {
        self.abandoned.increment(count as u64);
    }
}
