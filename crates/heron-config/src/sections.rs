//! Configuration sections.

use heron_extract::MultipartConfig;
use heron_signature::DEFAULT_MAX_BODY_SIZE;
use heron_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

/// Request binding settings.
///
/// ```toml
/// [binding]
/// max_body_size = 10485760
/// offload_sync_handlers = true
/// warn_unused_path_keys = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindingSection {
    /// Maximum JSON body size in bytes.
    pub max_body_size: usize,
    /// Run blocking handlers on the blocking pool.
    pub offload_sync_handlers: bool,
    /// Warn about route placeholders no parameter consumes.
    pub warn_unused_path_keys: bool,
}

impl Default for BindingSection {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            offload_sync_handlers: true,
            warn_unused_path_keys: true,
        }
    }
}

/// Form reader limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultipartSection {
    /// Maximum total form body size in bytes.
    pub max_body_size: usize,
    /// Maximum size of a single field in bytes.
    pub max_field_size: usize,
    /// Maximum number of fields.
    pub max_fields: usize,
}

impl Default for MultipartSection {
    fn default() -> Self {
        let limits = MultipartConfig::default();
        Self {
            max_body_size: limits.max_body_size,
            max_field_size: limits.max_field_size,
            max_fields: limits.max_fields,
        }
    }
}

impl From<&MultipartSection> for MultipartConfig {
    fn from(section: &MultipartSection) -> Self {
        MultipartConfig::new()
            .max_body_size(section.max_body_size)
            .max_field_size(section.max_field_size)
            .max_fields(section.max_fields)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Level or filter directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Include file and line in each event.
    pub include_location: bool,
    /// Service name reported at startup.
    pub service_name: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_location: false,
            service_name: "heron".to_string(),
        }
    }
}

impl LoggingSection {
    /// Returns the level part of the directive, ignoring per-target overrides.
    pub(crate) fn base_level(&self) -> Option<&str> {
        self.level
            .split(',')
            .map(str::trim)
            .find(|directive| !directive.contains('='))
    }
}

impl From<&LoggingSection> for LogConfig {
    fn from(section: &LoggingSection) -> Self {
        let base = match section.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            level: section.level.clone(),
            file_line_info: section.include_location,
            service_name: section.service_name.clone(),
            ..base
        }
    }
}
