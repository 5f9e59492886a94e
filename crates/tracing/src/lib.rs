//! Logging setup for filsync processes.
//!
//! Library crates never install a subscriber: they log through `tracing` macros under one of the
//! [`SUBSYSTEM_TARGETS`] and run their background tasks inside a caller supplied
//! [`tracing::Span`]. A process installs its layers once with [`FilsyncTracer`], tests use
//! [`init_test_tracing`].
//!
//! # Examples
//!
//! ```
//! use filsync_tracing::{
//!     tracing::level_filters::LevelFilter, FilsyncTracer, LayerInfo, LogFormat, Tracer,
//! };
//!
//! fn main() -> eyre::Result<()> {
//!     let stdout = LayerInfo::new(
//!         LogFormat::Json,
//!         LevelFilter::WARN.to_string(),
//!         "deals::asks=trace".to_string(),
//!         None,
//!     )
//!     .with_subsystem_level(LevelFilter::DEBUG);
//!
//!     let _guard = FilsyncTracer::new().with_stdout(stdout).init()?;
//!     tracing::info!(target: "deals", "logging installed");
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

// Re-export tracing crates
pub use tracing;
pub use tracing_appender;
pub use tracing_subscriber;

// Re-export our types
pub use formatter::LogFormat;
pub use layers::FileInfo;
pub use test_tracer::TestTracer;

mod formatter;
mod layers;
mod test_tracer;

use crate::layers::Layers;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log targets of the filsync subsystems.
///
/// Library crates log under these targets, so a directive like `deals::watcher=trace` selects
/// a single subsystem.
pub const SUBSYSTEM_TARGETS: &[&str] = &[
    "fetcher",
    "index",
    "deals",
    "deals::asks",
    "deals::watcher",
    "reputation",
    "reputation::sources",
    "tasks",
];

/// Installs the logging layers of a filsync process.
///
/// Logs always go to stdout. A rolling log file is added with [`FilsyncTracer::with_file`].
#[derive(Debug, Clone, Default)]
pub struct FilsyncTracer {
    stdout: LayerInfo,
    file: Option<(LayerInfo, FileInfo)>,
}

impl FilsyncTracer {
    /// Creates a tracer logging to stdout with [`LayerInfo::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stdout layer configuration.
    pub fn with_stdout(mut self, config: LayerInfo) -> Self {
        self.stdout = config;
        self
    }

    /// Adds a rolling file layer.
    pub fn with_file(mut self, config: LayerInfo, file_info: FileInfo) -> Self {
        self.file = Some((config, file_info));
        self
    }
}

/// Format and filters of one logging layer.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    format: LogFormat,
    default_directive: String,
    filters: String,
    color: Option<String>,
}

impl LayerInfo {
    /// Creates a layer configuration.
    ///
    /// `filters` is a comma separated list of directives applied on top of `RUST_LOG` and
    /// `default_directive`. `color` is `always`, `auto` or `never`, `None` disables colors.
    pub const fn new(
        format: LogFormat,
        default_directive: String,
        filters: String,
        color: Option<String>,
    ) -> Self {
        Self { format, default_directive, filters, color }
    }

    /// Sets the level of every filsync subsystem, leaving other targets at the default
    /// directive.
    pub fn with_subsystem_level(mut self, level: LevelFilter) -> Self {
        for target in SUBSYSTEM_TARGETS {
            if !self.filters.is_empty() {
                self.filters.push(',');
            }
            self.filters.push_str(&format!("{target}={level}"));
        }
        self
    }

    /// Returns the additional directives of the layer.
    pub fn filters(&self) -> &str {
        &self.filters
    }
}

impl Default for LayerInfo {
    /// Colored terminal output at `INFO`.
    fn default() -> Self {
        Self {
            format: LogFormat::Terminal,
            default_directive: LevelFilter::INFO.to_string(),
            filters: String::new(),
            color: Some("always".to_string()),
        }
    }
}

/// Installs a global tracing subscriber.
pub trait Tracer {
    /// Installs the subscriber.
    ///
    /// Returns the [`WorkerGuard`] of the file layer, if any. File logs are flushed until it is
    /// dropped.
    fn init(self) -> eyre::Result<Option<WorkerGuard>>;
}

impl Tracer for FilsyncTracer {
    fn init(self) -> eyre::Result<Option<WorkerGuard>> {
        let mut layers = Layers::new();
        layers.stdout(
            self.stdout.format,
            self.stdout.default_directive.parse()?,
            &self.stdout.filters,
            self.stdout.color,
        )?;
        let file_guard = self
            .file
            .map(|(config, file_info)| layers.file(config.format, &config.filters, file_info))
            .transpose()?;

        // fails only if a global subscriber is already installed
        if let Err(err) = tracing_subscriber::registry().with(layers.into_inner()).try_init() {
            tracing::warn!(%err, "tracing subscriber was already initialized");
        }
        Ok(file_guard)
    }
}

/// Installs a [`TestTracer`], ignoring failures.
pub fn init_test_tracing() {
    let _ = TestTracer::default().init();
}
