//! Observability for Hermes.
//!
//! - **Logging**: structured JSON or pretty logs via `tracing-subscriber`
//! - **Metrics**: counters recorded through the `metrics` facade; the host
//!   application installs whichever recorder it exports with
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `hermes_exchanges_total` | Counter | `side`, `outcome` | Completed message exchanges |
//! | `hermes_exchange_duration_seconds` | Histogram | `side` | Exchange latency |
//! | `hermes_handler_faults_total` | Counter | `handler` | Faults returned by handlers |
//! | `hermes_async_submissions_total` | Counter | `result` | Async submissions |
//! | `hermes_one_way_suppressed_total` | Counter | - | One-way faults suppressed after handoff |
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(exchange_id = %id, "exchange started");
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{fields, init_logging, LogConfig, OutputFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
