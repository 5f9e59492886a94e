//! Deal service metrics.

use metrics::{register_counter, register_gauge, Counter, Gauge};

/// Ask cache metrics.
#[derive(Clone)]
pub(crate) struct AskCacheMetrics {
    /// Number of completed refresh cycles
    cycles: Counter,
    /// Number of refresh cycles aborted before publishing
    failed_cycles: Counter,
    /// Number of asks in the current snapshot
    asks: Gauge,
}

impl AskCacheMetrics {
    pub(crate) fn new() -> Self {
        Self {
            cycles: register_counter!("deals.asks.cycles"),
            failed_cycles: register_counter!("deals.asks.failed_cycles"),
            asks: register_gauge!("deals.asks.snapshot_size"),
        }
    }

    pub(crate) fn record_published(&self, asks: usize) {
        self.cycles.increment(1);
        self.asks.set(asks as f64);
    }

    pub(crate) fn inc_failed_cycles(&self) {
        self.failed_cycles.increment(1);
    }
}

/// Deal watcher metrics, shared by all watches.
#[derive(Clone)]
pub(crate) struct DealWatcherMetrics {
    /// Number of active watches
    watches: Gauge,
    /// Number of deal info queries that failed or timed out
    failed_queries: Counter,
    /// Number of state updates delivered
    updates: Counter,
    /// Number of state updates dropped on a full channel
    dropped_updates: Counter,
}

impl DealWatcherMetrics {
    pub(crate) fn new() -> Self {
        Self {
            watches: register_gauge!("deals.watcher.watches"),
            failed_queries: register_counter!("deals.watcher.failed_queries"),
            updates: register_counter!("deals.watcher.updates"),
            dropped_updates: register_counter!("deals.watcher.dropped_updates"),
        }
    }

    pub(crate) fn inc_watches(&self) {
        self.watches.increment(1.0);
    }

    pub(crate) fn dec_watches(&self) {
        self.watches.decrement(1.0);
    }

    pub(crate) fn inc_failed_queries(&self) {
        self.failed_queries.increment(1);
    }

    pub(crate) fn inc_updates(&self) {
        self.updates.increment(1);
    }

    pub(crate) fn inc_dropped_updates(&self) {
        self.dropped_updates.increment(1);
    }
}
