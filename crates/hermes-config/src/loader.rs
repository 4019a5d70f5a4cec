//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::{ConfigError, HermesConfig, LogFormat, OneWayFaultMode, ReentryMode};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values or a preset
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use hermes_config::ConfigLoader;
///
/// # fn main() -> Result<(), hermes_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("hermes.toml")?
///     .with_env_prefix("HERMES")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HermesConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HermesConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = HermesConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// ```
    /// use hermes_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HermesConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HermesConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is picked from the extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or unreadable, is not
    /// valid TOML/JSON, or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = Self::parse_file(&content, path)?;
        debug!(path = %path.display(), "loaded configuration file");

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` (`toml` or `json`).
    ///
    /// ```
    /// use hermes_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [executor]
    ///     max_concurrent = 8
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.executor.max_concurrent, 8);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `HERMES__EXECUTOR__MAX_CONCURRENT=64` or
    /// `HERMES__DISPATCH__ONE_WAY_FAULT_POLICY=suppress`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env file"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(ConfigError::validation_error(format!("invalid .env file: {err}"))),
        }
        Ok(self)
    }

    /// Apply environment overrides, validate, and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation fails.
    pub fn load(mut self) -> Result<HermesConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without env overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HermesConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<HermesConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> = env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;
        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_bool(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }
            ["LOGGING", "SPAN_EVENTS"] => config.logging.span_events = parse_bool(key, value)?,
            ["LOGGING", "INCLUDE_LOCATION"] => config.logging.include_location = parse_bool(key, value)?,
            ["LOGGING", "SERVICE_NAME"] => config.logging.service_name = value.to_string(),

            ["EXECUTOR", "MAX_CONCURRENT"] => config.executor.max_concurrent = parse_int(key, value)?,
            ["EXECUTOR", "DEFAULT_TIMEOUT_SECS"] => {
                config.executor.default_timeout_secs = parse_optional_int(key, value)?;
            }
            ["EXECUTOR", "MAX_REGISTRY_SIZE"] => config.executor.max_registry_size = parse_int(key, value)?,
            ["EXECUTOR", "HISTORY_RETENTION_SECS"] => {
                config.executor.history_retention_secs = parse_int(key, value)?;
            }

            ["DISPATCH", "PIVOT_REENTRY"] => config.dispatch.pivot_reentry = parse_reentry(key, value)?,
            ["DISPATCH", "ONE_WAY_FAULT_POLICY"] => {
                config.dispatch.one_way_fault_policy = match value.to_lowercase().as_str() {
                    "propagate" => OneWayFaultMode::Propagate,
                    "suppress" => OneWayFaultMode::Suppress,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'propagate' or 'suppress'",
                        ))
                    }
                };
            }
            ["DISPATCH", "TIMEOUT_MS"] => config.dispatch.timeout_ms = parse_optional_int(key, value)?,

            ["SERVER", "EXPOSE_ERROR_CHAIN"] => config.server.expose_error_chain = parse_bool(key, value)?,
            ["SERVER", "PIVOT_REENTRY"] => config.server.pivot_reentry = parse_reentry(key, value)?,

            _ => debug!(var = key, "ignoring unknown configuration variable"),
        }

        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_optional_int(key: &str, value: &str) -> Result<Option<u64>, ConfigError> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer or 'none'"))
}

fn parse_reentry(key: &str, value: &str) -> Result<ReentryMode, ConfigError> {
    match value.to_lowercase().as_str() {
        "include" => Ok(ReentryMode::Include),
        "skip" => Ok(ReentryMode::Skip),
        _ => Err(ConfigError::env_parse_error(key, "expected 'include' or 'skip'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, HermesConfig::default());
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"dispatch": {"timeout_ms": 2000, "pivot_reentry": "skip"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.dispatch.timeout_ms, Some(2000));
        assert_eq!(config.dispatch.pivot_reentry, ReentryMode::Skip);
    }

    #[test]
    fn test_loader_with_string_unknown_format() {
        let result = ConfigLoader::new().with_string("", "yaml");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_section() {
        let result = ConfigLoader::new().with_string("[metrics]\nenabled = true", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/hermes.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/hermes.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, HermesConfig::default());
    }

    #[test]
    fn test_load_unvalidated_skips_validation() {
        let config = ConfigLoader::new()
            .with_string("[executor]\nmax_concurrent = 0", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.executor.max_concurrent, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env_var_sections() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__LEVEL", "trace", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__FORMAT", "pretty", "TEST").unwrap();
        loader.apply_env_var("TEST__EXECUTOR__MAX_CONCURRENT", "12", "TEST").unwrap();
        loader.apply_env_var("TEST__EXECUTOR__DEFAULT_TIMEOUT_SECS", "none", "TEST").unwrap();
        loader.apply_env_var("TEST__DISPATCH__ONE_WAY_FAULT_POLICY", "suppress", "TEST").unwrap();
        loader.apply_env_var("TEST__DISPATCH__TIMEOUT_MS", "250", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__EXPOSE_ERROR_CHAIN", "yes", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__PIVOT_REENTRY", "skip", "TEST").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.executor.max_concurrent, 12);
        assert_eq!(config.executor.default_timeout_secs, None);
        assert_eq!(config.dispatch.one_way_fault_policy, OneWayFaultMode::Suppress);
        assert_eq!(config.dispatch.timeout_ms, Some(250));
        assert!(config.server.expose_error_chain);
        assert_eq!(config.server.pivot_reentry, ReentryMode::Skip);
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__EXECUTOR__MAX_CONCURRENT", "many", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__SERVER__EXPOSE_ERROR_CHAIN", "maybe", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__DISPATCH__PIVOT_REENTRY", "sideways", "TEST").is_err());
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__TRANSPORT__PORT", "8080", "TEST").unwrap();
        assert_eq!(loader.load_unvalidated(), HermesConfig::default());
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_bool("K", "ON").unwrap());
        assert!(!parse_bool("K", "0").unwrap());
        assert_eq!(parse_int::<usize>("K", " 7 ").unwrap(), 7);
        assert_eq!(parse_optional_int("K", "").unwrap(), None);
        assert_eq!(parse_optional_int("K", "30").unwrap(), Some(30));
    }
}
