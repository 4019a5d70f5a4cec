//! Configuration schema types.
//!
//! Each section maps onto the settings type of the crate it configures.

use std::time::Duration;

use hermes_chain::PivotReentry;
use hermes_dispatch::{ExecutorConfig, InvocationOptions, OneWayFaultPolicy, ServerConfig};
use hermes_telemetry::{LogConfig, OutputFormat};
use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging section.
///
/// ```
/// use hermes_config::{LogFormat, LoggingSection};
///
/// let section = LoggingSection::default();
/// assert_eq!(section.level, "info");
/// assert_eq!(section.format, LogFormat::Json);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Whether logging is installed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Level or `EnvFilter` directive.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Emit span enter/exit events.
    #[serde(default)]
    pub span_events: bool,

    /// Include file and line of each event.
    #[serde(default)]
    pub include_location: bool,

    /// Service name attached to the startup event.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: LogFormat::default(),
            span_events: false,
            include_location: false,
            service_name: default_service_name(),
        }
    }
}

impl LoggingSection {
    /// Converts the section into a telemetry logging configuration.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: match self.format {
                LogFormat::Json => OutputFormat::Json,
                LogFormat::Pretty => OutputFormat::Pretty,
            },
            span_events: self.span_events,
            include_location: self.include_location,
            service_name: self.service_name.clone(),
        }
    }
}

/// Executor section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    /// Maximum number of async exchanges running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Timeout of every async exchange in seconds. `None` disables it.
    #[serde(default = "default_task_timeout")]
    pub default_timeout_secs: Option<u64>,

    /// Maximum number of task records kept for inspection.
    #[serde(default = "default_max_registry_size")]
    pub max_registry_size: usize,

    /// How long finished task records are kept, in seconds.
    #[serde(default = "default_history_retention")]
    pub history_retention_secs: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout_secs: default_task_timeout(),
            max_registry_size: default_max_registry_size(),
            history_retention_secs: default_history_retention(),
        }
    }
}

impl ExecutorSection {
    /// Converts the section into an executor configuration.
    pub fn to_executor_config(&self) -> ExecutorConfig {
        let config = ExecutorConfig::new()
            .with_max_concurrent(self.max_concurrent)
            .with_max_registry_size(self.max_registry_size)
            .with_history_retention(Duration::from_secs(self.history_retention_secs));
        match self.default_timeout_secs {
            Some(secs) => config.with_default_timeout(Duration::from_secs(secs)),
            None => config.without_timeout(),
        }
    }
}

/// Where the reverse pass starts after a handler pivots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryMode {
    /// The pivoting handler sees the reversed message too.
    #[default]
    Include,
    /// The reverse pass starts before the pivoting handler.
    Skip,
}

impl From<ReentryMode> for PivotReentry {
    fn from(mode: ReentryMode) -> Self {
        match mode {
            ReentryMode::Include => PivotReentry::Include,
            ReentryMode::Skip => PivotReentry::Skip,
        }
    }
}

/// Fate of outbound handler faults on one-way calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OneWayFaultMode {
    /// Return the fault to the caller.
    #[default]
    Propagate,
    /// Log and drop the fault.
    Suppress,
}

impl From<OneWayFaultMode> for OneWayFaultPolicy {
    fn from(mode: OneWayFaultMode) -> Self {
        match mode {
            OneWayFaultMode::Propagate => OneWayFaultPolicy::Propagate,
            OneWayFaultMode::Suppress => OneWayFaultPolicy::Suppress,
        }
    }
}

/// Client dispatch section: defaults for every invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    /// Reverse pass behaviour after a pivot.
    #[serde(default)]
    pub pivot_reentry: ReentryMode,

    /// One-way fault policy.
    #[serde(default)]
    pub one_way_fault_policy: OneWayFaultMode,

    /// Response timeout in milliseconds. `None` waits indefinitely.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl DispatchSection {
    /// Converts the section into default invocation options.
    pub fn to_invocation_options(&self) -> InvocationOptions {
        let options = InvocationOptions::new()
            .with_pivot_reentry(self.pivot_reentry.into())
            .with_one_way_fault_policy(self.one_way_fault_policy.into());
        match self.timeout_ms {
            Some(ms) => options.with_timeout(Duration::from_millis(ms)),
            None => options,
        }
    }
}

/// Server runtime section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Put the error chain of runtime faults into fault strings.
    #[serde(default)]
    pub expose_error_chain: bool,

    /// Reverse pass behaviour after a pivot.
    #[serde(default)]
    pub pivot_reentry: ReentryMode,
}

impl ServerSection {
    /// Converts the section into a server runtime configuration.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig::new()
            .with_error_chain(self.expose_error_chain)
            .with_pivot_reentry(self.pivot_reentry.into())
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "hermes".to_string()
}

fn default_max_concurrent() -> usize {
    256
}

fn default_task_timeout() -> Option<u64> {
    Some(300)
}

fn default_max_registry_size() -> usize {
    10_000
}

fn default_history_retention() -> u64 {
    3600
}
