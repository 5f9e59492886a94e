use crate::layers::BoxedLayer;
use serde::{Deserialize, Serialize};
use std::{fmt, fmt::Display, str::FromStr};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Represents the logging format.
///
/// Used to configure the format layer of a tracing subscriber.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Log records as JSON objects, suitable for structured log collection.
    Json,

    /// logfmt (key=value) formatting.
    LogFmt,

    /// Terminal-friendly formatting.
    #[default]
    Terminal,
}

impl LogFormat {
    /// Builds the formatting layer, writing to `writer` or stdout.
    ///
    /// The logfmt layer only writes to stdout, file output falls back to the plain format
    /// without colors.
    pub(crate) fn apply(
        self,
        filter: EnvFilter,
        ansi: bool,
        writer: Option<NonBlocking>,
    ) -> BoxedLayer<Registry> {
        let target = show_target(&filter);
        let layer = tracing_subscriber::fmt::layer().with_ansi(ansi).with_target(target);
        match (self, writer) {
            (Self::Json, Some(writer)) => {
                layer.json().with_writer(writer).with_filter(filter).boxed()
            }
            (Self::Json, None) => layer.json().with_filter(filter).boxed(),
            (Self::LogFmt, None) => tracing_logfmt::layer().with_filter(filter).boxed(),
            (Self::LogFmt | Self::Terminal, Some(writer)) => {
                layer.with_ansi(false).with_writer(writer).with_filter(filter).boxed()
            }
            (Self::Terminal, None) => layer.with_filter(filter).boxed(),
        }
    }
}

/// Resolves a layer's color setting, `RUST_LOG_STYLE=never` disables colors everywhere.
pub(crate) fn use_ansi(color: Option<&str>) -> bool {
    let Some(color) = color else { return false };
    match std::env::var("RUST_LOG_STYLE") {
        Ok(style) => style != "never",
        Err(_) => color != "never",
    }
}

/// Targets are printed when `RUST_LOG_TARGET` is set to anything but `0`, or by default when the
/// filter lets debug records through.
fn show_target(filter: &EnvFilter) -> bool {
    match std::env::var("RUST_LOG_TARGET") {
        Ok(val) => val != "0",
        Err(_) => filter.max_level_hint().map_or(true, |max| max > LevelFilter::INFO),
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::LogFmt => write!(f, "log-fmt"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "log-fmt" | "logfmt" => Ok(Self::LogFmt),
            "terminal" => Ok(Self::Terminal),
            other => Err(eyre::eyre!("unknown log format: {other}")),
        }
    }
}
