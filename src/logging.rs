//! Structured logging for the relay.
//!
//! - `SCENELINK_LOG` (falls back to `RUST_LOG`): filter directive, e.g.
//!   `scenelink=debug,reqwest=warn`
//! - `SCENELINK_LOG_FORMAT`: `pretty`, `compact` (default) or `json`
//!
//! ```bash
//! SCENELINK_LOG_FORMAT=json scenelink run
//! scenelink run --verbose --log-format pretty
//! ```

use std::str::FromStr;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "scenelink=info,warn";
const VERBOSE_FILTER: &str = "scenelink=debug,info";

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
    /// Tag each event with its source file and line.
    pub with_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            with_file: false,
        }
    }
}

impl LogConfig {
    /// Read the filter and format from the environment. An unknown format
    /// falls back to compact.
    pub fn from_env() -> Self {
        let filter = std::env::var("SCENELINK_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        let format = std::env::var("SCENELINK_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    /// Debug-level relay logs with source locations.
    pub fn verbose(self) -> Self {
        Self {
            filter: VERBOSE_FILTER.to_string(),
            with_file: true,
            ..self
        }
    }

    pub fn with_format(self, format: Option<LogFormat>) -> Self {
        Self {
            format: format.unwrap_or(self.format),
            ..self
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: LogConfig) {
    let filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let layer = fmt::layer()
        .with_file(config.with_file)
        .with_line_number(config.with_file);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match config.format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
    };
}
