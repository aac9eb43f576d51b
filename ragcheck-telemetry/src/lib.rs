//! Logging setup for ragcheck binaries and tests.
//!
//! [`init_telemetry`] installs a global `tracing` subscriber with an
//! `EnvFilter` and a formatted output layer. [`EventCapture`] records events
//! in memory so tests can assert on what was logged.

pub mod capture;

pub use capture::{CapturedEvent, EventCapture};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `"info,ragcheck_rag=debug"`.
    pub default_directive: String,
    pub format: LogFormat,
    /// Include the event target (module path) in each line.
    pub with_target: bool,
    /// Emit ANSI colour codes. Ignored for JSON.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            format: LogFormat::Compact,
            with_target: true,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// Build the filter: `RUST_LOG` wins, the configured directive is the fallback.
    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_directive).map_err(|e| {
                TelemetryError::InvalidFilter {
                    directive: self.default_directive.clone(),
                    message: e.to_string(),
                }
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("A global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// [`TelemetryError::InvalidFilter`] for a malformed directive and
/// [`TelemetryError::AlreadyInitialized`] if a global subscriber exists.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter()?;

    // Exactly one of these is `Some`; `Option<Layer>` is itself a layer.
    let (pretty, compact, json) = match config.format {
        LogFormat::Pretty => (
            Some(fmt::layer().pretty().with_target(config.with_target).with_ansi(config.ansi)),
            None,
            None,
        ),
        LogFormat::Compact => (
            None,
            Some(fmt::layer().compact().with_target(config.with_target).with_ansi(config.ansi)),
            None,
        ),
        LogFormat::Json => {
            (None, None, Some(fmt::layer().json().with_target(config.with_target)))
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(compact)
        .with(json)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(format = ?config.format, "telemetry initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_directive, "info");
        assert!(config.with_target);
    }

    #[test]
    fn malformed_directive_is_rejected() {
        // SAFETY: the test binary does not read RUST_LOG concurrently.
        unsafe { std::env::remove_var("RUST_LOG") };
        let config = TelemetryConfig::default().with_directive("info,ragcheck_rag=loud");
        assert!(matches!(config.env_filter(), Err(TelemetryError::InvalidFilter { .. })));
    }
}
