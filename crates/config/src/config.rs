//! Configuration files.

use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Configuration of all filsync services.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Ask cache configuration.
    pub asks: AskCacheConfig,
    /// Deal watcher configuration.
    pub deals: DealWatcherConfig,
    /// Reputation engine configuration.
    pub reputation: ReputationConfig,
}

impl Config {
    /// Loads the configuration at `path`, writing the default configuration there if the file
    /// doesn't exist.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, confy::ConfyError> {
        confy::load_path(path.as_ref())
    }

    /// Writes the configuration to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), confy::ConfyError> {
        confy::store_path(path.as_ref(), self)
    }
}

/// Ask cache configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct AskCacheConfig {
    /// Time between the end of a refresh cycle and the start of the next one.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Timeout of a single miner's peer id and ask query.
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
    /// Deadline of all ask queries of one cycle.
    #[serde(with = "humantime_serde")]
    pub batch_deadline: Duration,
    /// The maximum number of ask queries in flight.
    pub max_concurrent_queries: usize,
}

impl Default for AskCacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(10),
            query_timeout: Duration::from_secs(20),
            batch_deadline: Duration::from_secs(60),
            max_concurrent_queries: 50,
        }
    }
}

/// Deal watcher configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct DealWatcherConfig {
    /// Delay before the first refresh of a watch.
    #[serde(with = "humantime_serde")]
    pub initial_wait: Duration,
    /// How long a state update may wait for room in the watch channel before it is dropped.
    #[serde(with = "humantime_serde")]
    pub channel_write_timeout: Duration,
    /// Timeout of a single deal info query.
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
    /// Refresh interval used in addition to head changes, disabled if unset.
    #[serde(with = "humantime_serde")]
    pub fallback_interval: Option<Duration>,
    /// Capacity of the watch channel.
    pub channel_capacity: usize,
}

impl Default for DealWatcherConfig {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(5),
            channel_write_timeout: Duration::from_secs(1),
            query_timeout: Duration::from_secs(20),
            fallback_interval: None,
            channel_capacity: 1,
        }
    }
}

/// Reputation engine configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Time between two refreshes of all external sources.
    #[serde(with = "humantime_serde")]
    pub source_refresh_interval: Duration,
    /// Timeout of a single source fetch.
    #[serde(with = "humantime_serde")]
    pub source_fetch_timeout: Duration,
    /// Deadline of all source fetches of one refresh.
    #[serde(with = "humantime_serde")]
    pub source_batch_deadline: Duration,
    /// The maximum number of source fetches in flight.
    pub max_concurrent_sources: usize,
    /// Weight of sources registered without an explicit weight.
    pub default_source_weight: f64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            source_refresh_interval: Duration::from_secs(90),
            source_fetch_timeout: Duration::from_secs(20),
            source_batch_deadline: Duration::from_secs(60),
            max_concurrent_sources: 3,
            default_source_weight: 1.0,
        }
    }
}
