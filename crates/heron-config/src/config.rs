//! Root configuration type.

use heron_extract::MultipartConfig;
use heron_signature::BindingOptions;
use heron_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::{BindingSection, ConfigError, LogFormat, LoggingSection, MultipartSection};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Complete Heron configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer files and environment
/// variables on top of the defaults.
///
/// # Example
///
/// ```
/// use heron_config::HeronConfig;
///
/// let config = HeronConfig::default();
/// assert!(config.binding.offload_sync_handlers);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeronConfig {
    /// Request binding settings.
    #[serde(default)]
    pub binding: BindingSection,

    /// Form reader limits.
    #[serde(default)]
    pub multipart: MultipartSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl HeronConfig {
    /// Pretty debug logging with source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LoggingSection {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                include_location: true,
                ..LoggingSection::default()
            },
            ..Self::default()
        }
    }

    /// JSON logging at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a size limit is zero or the
    /// log level is not recognized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("binding.max_body_size", self.binding.max_body_size),
            ("multipart.max_body_size", self.multipart.max_body_size),
            ("multipart.max_field_size", self.multipart.max_field_size),
            ("multipart.max_fields", self.multipart.max_fields),
        ];
        if let Some((field, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::invalid_value(*field, "must be greater than zero"));
        }

        if self.multipart.max_field_size > self.multipart.max_body_size {
            return Err(ConfigError::invalid_value(
                "multipart.max_field_size",
                "must not exceed multipart.max_body_size",
            ));
        }

        match self.logging.base_level() {
            Some(level) if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) => {
                Err(ConfigError::invalid_value(
                    "logging.level",
                    format!("unknown level '{level}'"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Runtime binding options.
    #[must_use]
    pub fn binding_options(&self) -> BindingOptions {
        BindingOptions {
            max_body_size: self.binding.max_body_size,
            multipart: self.multipart_config(),
            offload_sync_handlers: self.binding.offload_sync_handlers,
            warn_unused_path_keys: self.binding.warn_unused_path_keys,
        }
    }

    /// Runtime form reader limits.
    #[must_use]
    pub fn multipart_config(&self) -> MultipartConfig {
        MultipartConfig::from(&self.multipart)
    }

    /// Runtime logging configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig::from(&self.logging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HeronConfig::default().validate().is_ok());
        assert!(HeronConfig::development().validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = HeronConfig::default();
        config.multipart.max_fields = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("multipart.max_fields"));
    }

    #[test]
    fn test_field_size_above_body_rejected() {
        let mut config = HeronConfig::default();
        config.multipart.max_body_size = 10;
        config.multipart.max_field_size = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_level_rejected() {
        let mut config = HeronConfig::default();
        config.logging.level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_directive_level_accepted() {
        let mut config = HeronConfig::default();
        config.logging.level = "WARN,heron_server=debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_binding_options() {
        let mut config = HeronConfig::default();
        config.binding.max_body_size = 2048;
        config.binding.warn_unused_path_keys = false;
        config.multipart.max_fields = 3;
        let options = config.binding_options();
        assert_eq!(options.max_body_size, 2048);
        assert!(!options.warn_unused_path_keys);
        assert!(options.offload_sync_handlers);
        assert_eq!(options.multipart.max_fields, 3);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result: Result<HeronConfig, _> = toml::from_str("[server]\nport = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<HeronConfig, _> = toml::from_str("[binding]\nmax_size = 1\n");
        assert!(result.is_err());
    }
}
