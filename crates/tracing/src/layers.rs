use crate::formatter::{use_ansi, LogFormat};
use std::path::PathBuf;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{filter::Directive, EnvFilter, Layer, Registry};

/// A boxed tracing [Layer].
pub(crate) type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Default number of rotated log files kept on disk.
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Manages the collection of layers for a tracing subscriber.
///
/// `Layers` acts as a container for the layers installed into the subscriber, which may
/// include stdout and file layers, each with their own format and filter.
#[derive(Default)]
pub(crate) struct Layers {
    inner: Vec<BoxedLayer<Registry>>,
}

impl Layers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consumes the `Layers` instance, returning the inner vector of layers.
    pub(crate) fn into_inner(self) -> Vec<BoxedLayer<Registry>> {
        self.inner
    }

    /// Adds a stdout layer with the given format, directives and color.
    pub(crate) fn stdout(
        &mut self,
        format: LogFormat,
        default_directive: Directive,
        filters: &str,
        color: Option<String>,
    ) -> eyre::Result<()> {
        let filter = build_env_filter(Some(default_directive), filters)?;
        let layer = format.apply(filter, use_ansi(color.as_deref()), None);
        self.inner.push(layer);
        Ok(())
    }

    /// Adds a rolling file layer and returns the [WorkerGuard] that flushes it on drop.
    pub(crate) fn file(
        &mut self,
        format: LogFormat,
        filter: &str,
        file_info: FileInfo,
    ) -> eyre::Result<WorkerGuard> {
        let (writer, guard) = file_info.create_log_writer()?;
        let file_filter = build_env_filter(None, filter)?;
        let layer = format.apply(file_filter, false, Some(writer));
        self.inner.push(layer);
        Ok(guard)
    }
}

/// Holds configuration information for file logging.
#[derive(Debug, Clone)]
pub struct FileInfo {
    dir: PathBuf,
    file_name: String,
    max_files: usize,
}

impl FileInfo {
    /// Creates a new `FileInfo` instance rotating daily and keeping the default number of files.
    pub fn new(dir: PathBuf, file_name: impl Into<String>) -> Self {
        Self { dir, file_name: file_name.into(), max_files: DEFAULT_MAX_LOG_FILES }
    }

    /// Sets the maximum number of rotated files kept on disk.
    pub const fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    fn create_log_writer(
        &self,
    ) -> eyre::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&self.file_name)
            .max_log_files(self.max_files)
            .build(&self.dir)?;
        Ok(tracing_appender::non_blocking(appender))
    }
}

/// Builds an [EnvFilter] from `RUST_LOG`, an optional default directive and a comma separated
/// list of additional directives.
pub(crate) fn build_env_filter(
    default_directive: Option<Directive>,
    directives: &str,
) -> eyre::Result<EnvFilter> {
    let env_filter = if let Some(default_directive) = default_directive {
        EnvFilter::builder().with_default_directive(default_directive).from_env_lossy()
    } else {
        EnvFilter::builder().from_env_lossy()
    };

    directives
        .split(',')
        .filter(|d| !d.is_empty())
        .try_fold(env_filter, |env_filter, directive| {
            Ok(env_filter.add_directive(directive.parse()?))
        })
}
