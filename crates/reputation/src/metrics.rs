//! Reputation engine metrics.

use metrics::{register_counter, register_gauge, Counter, Gauge};

/// Reputation engine metrics.
#[derive(Clone)]
pub(crate) struct ReputationMetrics {
    /// Number of score table rebuilds
    rebuilds: Counter,
    /// Number of rebuild requests folded into a pending one
    coalesced_requests: Counter,
    /// Number of failed rebuilds
    failed_rebuilds: Counter,
    /// Number of ranked miners
    ranked_miners: Gauge,
    /// Number of source refreshes that could not read the registry
    failed_source_refreshes: Counter,
}

impl ReputationMetrics {
    pub(crate) fn new() -> Self {
        Self {
            rebuilds: register_counter!("reputation.rebuilds"),
            coalesced_requests: register_counter!("reputation.coalesced_requests"),
            failed_rebuilds: register_counter!("reputation.failed_rebuilds"),
            ranked_miners: register_gauge!("reputation.ranked_miners"),
            failed_source_refreshes: register_counter!("reputation.failed_source_refreshes"),
        }
    }

    pub(crate) fn record_rebuild(&self, miners: usize) {
        self.rebuilds.increment(1);
        self.ranked_miners.set(miners as f64);
    }

    pub(crate) fn inc_coalesced_requests(&self) {
        self.coalesced_requests.increment(1);
    }

    pub(crate) fn inc_failed_rebuilds(&self) {
        self.failed_rebuilds.increment(1);
    }

    pub(crate) fn inc_failed_source_refreshes(&self) {
        self.failed_source_refreshes.increment(1);
    }
}
