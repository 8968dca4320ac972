//! Subscriber setup for the crate's `tracing` events.
//!
//! The library itself only emits events: `info` when a memory planner is
//! built, `debug` for compile passes and arena growth, `trace` per executed
//! node and `warn` when a call fails. Binaries and tests opt in with
//! [`init_tracing`].
//!
//! Environment:
//! - `STASIS_LOG`: filter directives, default `stasis=info`
//! - `STASIS_LOG_FORMAT`: `pretty` or `compact`, default `pretty`

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const DEFAULT_FILTER: &str = "stasis=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("compact") {
            LogFormat::Compact
        } else {
            LogFormat::Pretty
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            with_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("STASIS_LOG").unwrap_or(defaults.filter),
            format: std::env::var("STASIS_LOG_FORMAT")
                .map(|value| LogFormat::parse(&value))
                .unwrap_or(defaults.format),
            ..defaults
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("a global tracing subscriber is already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Installs a global `fmt` subscriber. Fails if one is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed(),
    };
    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}
