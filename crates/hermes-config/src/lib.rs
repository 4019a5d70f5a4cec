//! Typed configuration for Hermes.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict parsing (unknown fields are errors) and validation
//! - Layered loading (defaults → file → env)
//!
//! [`HermesConfig`] holds one section per configurable crate. Each section
//! converts into that crate's settings type:
//!
//! - [`LoggingSection`] → `hermes_telemetry::LogConfig`
//! - [`ExecutorSection`] → `hermes_dispatch::ExecutorConfig`
//! - [`DispatchSection`] → `hermes_dispatch::InvocationOptions`
//! - [`ServerSection`] → `hermes_dispatch::ServerConfig`
//!
//! Declared `handler_chains` feed a [`ConfiguredResolver`](hermes_chain::ConfiguredResolver)
//! through [`HermesConfig::resolver`].
//!
//! # Configuration File Format
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [executor]
//! max_concurrent = 256
//! default_timeout_secs = 300
//!
//! [dispatch]
//! pivot_reentry = "include"
//! one_way_fault_policy = "propagate"
//! timeout_ms = 30000
//!
//! [server]
//! expose_error_chain = false
//!
//! [[handler_chains]]
//! port_name_pattern = "{http://duke.example.org}AddNumbers*"
//! protocol_bindings = ["##SOAP11_HTTP"]
//!
//! [[handler_chains.handlers]]
//! name = "AuditHandler"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Scalar values can be overridden with `PREFIX__SECTION__KEY`:
//!
//! - `HERMES__LOGGING__LEVEL=debug`
//! - `HERMES__EXECUTOR__DEFAULT_TIMEOUT_SECS=none`
//! - `HERMES__SERVER__EXPOSE_ERROR_CHAIN=true`

#![doc(html_root_url = "https://docs.rs/hermes-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{HermesConfig, HermesConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    DispatchSection, ExecutorSection, LogFormat, LoggingSection, OneWayFaultMode, ReentryMode,
    ServerSection,
};
