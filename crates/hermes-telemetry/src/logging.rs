//! Structured logging for Hermes.
//!
//! Every exchange logs with an `exchange_id` field so the handler callbacks of
//! one exchange can be correlated. Handler lifecycle transitions are emitted at
//! `debug`, executor lifecycle at `info`, and suppressed one-way faults at
//! `warn`.
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::logging::{LogConfig, init_logging};
//!
//! let config = LogConfig::default();
//! init_logging(&config)?;
//!
//! tracing::debug!(exchange_id = %id, handler = "AuditHandler", "handle_message");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log line rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,
    /// Filter directive, e.g. `info` or `hermes_chain=debug,info`.
    pub level: String,
    /// Output format.
    pub format: OutputFormat,
    /// Log span creation and close.
    pub span_events: bool,
    /// Include source file and line.
    pub include_location: bool,
    /// Reported once logging is up.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Debug level, pretty output with spans and source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: OutputFormat::Pretty,
            span_events: true,
            include_location: true,
            ..Self::production()
        }
    }

    /// Info level JSON lines.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: OutputFormat::Json,
            span_events: false,
            include_location: false,
            service_name: "hermes".to_string(),
        }
    }
}

/// Installs the global subscriber.
///
/// Disabled configurations are accepted without touching the subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` for a bad filter and
/// `TelemetryError::LoggingInit` if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location);
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        OutputFormat::Json => fmt_layer.json().boxed(),
        OutputFormat::Pretty => fmt_layer.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(service.name = %config.service_name, "logging initialized");
    Ok(())
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::InvalidConfig(format!("invalid log level: {e}")))
}

/// Field names shared by every Hermes crate.
pub mod fields {
    /// Exchange ID.
    pub const EXCHANGE_ID: &str = "exchange_id";
    /// Handler name.
    pub const HANDLER: &str = "handler";
    /// Endpoint address.
    pub const ADDRESS: &str = "address";
    /// Executor task ID.
    pub const TASK_ID: &str = "task_id";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let production = LogConfig::production();
        assert_eq!(production.format, OutputFormat::Json);
        assert_eq!(production.level, "info");
        assert!(!production.include_location);

        let development = LogConfig::development();
        assert_eq!(development.format, OutputFormat::Pretty);
        assert!(development.span_events && development.include_location);
        assert_eq!(development.service_name, "hermes");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(fields::EXCHANGE_ID, "exchange_id");
        assert_eq!(fields::HANDLER, "handler");
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("hermes_chain=debug,info").is_ok());
        assert!(matches!(
            create_env_filter("hermes_chain=notalevel"),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
