//! Log output for the `adrunner` binary and for hosts embedding the runner.
//!
//! Everything goes to stderr. The run span opened by each waterfall is
//! carried into JSON lines so they can be grouped by `run_id`.

use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, coloured when stderr is a terminal.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// `RUST_LOG` directives, falling back to `level` for anything unset.
fn run_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}

fn stderr_layer(format: LogFormat, filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => layer
            .with_ansi(std::io::stderr().is_terminal())
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_filter(filter)
            .boxed(),
    }
}

/// Install the global subscriber, failing if one is already set.
pub fn try_init_tracing(format: LogFormat, level: Level) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(stderr_layer(format, run_filter(level)))
        .try_init()
}

/// Install the global subscriber unless the host already did.
pub fn init_tracing(json: bool, level: Level) {
    if let Err(err) = try_init_tracing(LogFormat::from_json_flag(json), level) {
        tracing::debug!(event = "telemetry.subscriber_exists", error = %err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_flag_selects_format() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Text);
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn test_second_install_is_rejected_not_fatal() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        assert!(try_init_tracing(LogFormat::Text, Level::WARN).is_err());
    }
}
