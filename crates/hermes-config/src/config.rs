//! Main configuration types.
//!
//! This module provides the top-level [`HermesConfig`] struct and its builder.

use std::collections::HashSet;
use std::str::FromStr;

use hermes_chain::{ConfiguredResolver, HandlerChainDescriptor, HandlerRegistry};
use hermes_core::{Protocol, QName};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, DispatchSection, ExecutorSection, LogFormat, LoggingSection, ServerSection};

/// Complete Hermes configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use hermes_config::HermesConfig;
///
/// let config = HermesConfig::default();
/// assert_eq!(config.executor.max_concurrent, 256);
/// assert!(config.handler_chains.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct HermesConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Async executor configuration.
    #[serde(default)]
    pub executor: ExecutorSection,

    /// Client invocation defaults.
    #[serde(default)]
    pub dispatch: DispatchSection,

    /// Server runtime configuration.
    #[serde(default)]
    pub server: ServerSection,

    /// Declared handler chains, matched against ports at resolution time.
    #[serde(default)]
    pub handler_chains: Vec<HandlerChainDescriptor>,
}

impl HermesConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> HermesConfigBuilder {
        HermesConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The log level is not a valid filter directive
    /// - An executor bound or timeout is zero
    /// - A chain pattern is not a qualified name
    /// - A chain lists an unknown protocol binding
    /// - A handler name is empty or repeated within its chain
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.enabled {
            hermes_telemetry::logging::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        if self.executor.max_concurrent == 0 {
            return Err(ConfigError::invalid_value("executor.max_concurrent", "must be at least 1"));
        }
        if self.executor.max_registry_size == 0 {
            return Err(ConfigError::invalid_value("executor.max_registry_size", "must be at least 1"));
        }
        if self.executor.default_timeout_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "executor.default_timeout_secs",
                "must be positive; omit it to disable the timeout",
            ));
        }
        if self.dispatch.timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "dispatch.timeout_ms",
                "must be positive; omit it to wait indefinitely",
            ));
        }

        for (index, chain) in self.handler_chains.iter().enumerate() {
            validate_chain(index, chain)?;
        }

        Ok(())
    }

    /// Checks that every handler of every chain has a registered factory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownHandler` for the first missing factory.
    pub fn check_registry(&self, registry: &HandlerRegistry) -> Result<(), ConfigError> {
        for (index, chain) in self.handler_chains.iter().enumerate() {
            if let Some(missing) = chain
                .handlers
                .iter()
                .find(|h| !registry.contains(h.factory_key()))
            {
                return Err(ConfigError::unknown_handler(index, missing.factory_key()));
            }
        }
        Ok(())
    }

    /// Builds a resolver over the declared chains.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownHandler` if a chain names a handler the
    /// registry cannot build.
    pub fn resolver(&self, registry: HandlerRegistry) -> Result<ConfiguredResolver, ConfigError> {
        self.check_registry(&registry)?;
        Ok(ConfiguredResolver::new(self.handler_chains.clone(), registry))
    }

    /// Development preset: pretty debug logs and error chains in faults.
    ///
    /// ```
    /// use hermes_config::HermesConfig;
    ///
    /// let config = HermesConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(config.server.expose_error_chain);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;
        config.server.expose_error_chain = true;
        config
    }

    /// Production preset: JSON info logs, error chains hidden.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.server.expose_error_chain = false;
        config
    }
}

fn validate_chain(index: usize, chain: &HandlerChainDescriptor) -> Result<(), ConfigError> {
    let field = |name: &str| format!("handler_chains[{index}].{name}");

    for (name, pattern) in [
        ("service_name_pattern", &chain.service_name_pattern),
        ("port_name_pattern", &chain.port_name_pattern),
    ] {
        if let Some(pattern) = pattern {
            QName::from_str(pattern).map_err(|e| ConfigError::invalid_value(field(name), e.to_string()))?;
        }
    }

    for binding in &chain.protocol_bindings {
        for token in binding.split_whitespace() {
            if Protocol::from_token(token).is_none() {
                return Err(ConfigError::invalid_value(
                    field("protocol_bindings"),
                    format!("unknown binding {token}"),
                ));
            }
        }
    }

    let mut seen = HashSet::new();
    for handler in &chain.handlers {
        if handler.name.trim().is_empty() {
            return Err(ConfigError::invalid_value(field("handlers"), "handler name is empty"));
        }
        if !seen.insert(handler.name.as_str()) {
            return Err(ConfigError::invalid_value(
                field("handlers"),
                format!("handler {} is listed twice", handler.name),
            ));
        }
    }

    Ok(())
}

/// Builder for [`HermesConfig`].
#[derive(Debug, Default)]
pub struct HermesConfigBuilder {
    logging: Option<LoggingSection>,
    executor: Option<ExecutorSection>,
    dispatch: Option<DispatchSection>,
    server: Option<ServerSection>,
    handler_chains: Vec<HandlerChainDescriptor>,
}

impl HermesConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingSection) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the executor section.
    #[must_use]
    pub fn executor(mut self, executor: ExecutorSection) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the dispatch section.
    #[must_use]
    pub fn dispatch(mut self, dispatch: DispatchSection) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerSection) -> Self {
        self.server = Some(server);
        self
    }

    /// Append a handler chain.
    #[must_use]
    pub fn handler_chain(mut self, chain: HandlerChainDescriptor) -> Self {
        self.handler_chains.push(chain);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> HermesConfig {
        HermesConfig {
            logging: self.logging.unwrap_or_default(),
            executor: self.executor.unwrap_or_default(),
            dispatch: self.dispatch.unwrap_or_default(),
            server: self.server.unwrap_or_default(),
            handler_chains: self.handler_chains,
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<HermesConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
