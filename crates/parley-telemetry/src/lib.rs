//! Tracing subscriber setup for the parley binary.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, for local runs.
    Pretty,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown log format: {0} (expected json or pretty)")]
pub struct UnknownLogFormat(String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "parley_server" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// Filter directives equivalent to this config, e.g. `info,parley_store=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Install the global subscriber. Later calls are ignored, so tests may call it freely.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init();
}
