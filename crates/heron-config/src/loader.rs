//! Layered configuration loading.
//!
//! Sources apply in order: defaults, then a TOML or JSON file, then
//! environment variables named `PREFIX_SECTION__KEY`
//! (for example `HERON_BINDING__MAX_BODY_SIZE=1048576`).

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{ConfigError, HeronConfig, LogFormat};

/// Builds a [`HeronConfig`] from layered sources.
///
/// # Example
///
/// ```
/// use heron_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_string("[binding]\nmax_body_size = 4096\n", "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.binding.max_body_size, 4096);
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HeronConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader starting from [`HeronConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HeronConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Resets to the default configuration.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = HeronConfig::default();
        self
    }

    /// Starts from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HeronConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HeronConfig::production();
        self
    }

    /// Loads a `.toml` or `.json` file, replacing the current configuration.
    /// Sections missing from the file take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, has an unknown
    /// extension, or fails to parse.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.config = parse(&content, format).map_err(|err| match err {
            ConfigError::UnsupportedFormat(_) => {
                ConfigError::UnsupportedFormat(path.display().to_string())
            }
            other => other,
        })?;
        self.file_loaded = true;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), skipping a missing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Parses configuration text in `format` (`"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown format or invalid content.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, format)?;
        Ok(self)
    }

    /// Enables environment overrides for variables starting with `prefix`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Reads a `.env` file into the process environment if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Returns `true` once a file has been loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if an override fails to parse or validation fails.
    pub fn load(self) -> Result<HeronConfig, ConfigError> {
        let vars = match &self.env_prefix {
            Some(prefix) => env::vars().filter(|(k, _)| k.starts_with(prefix.as_str())).collect(),
            None => BTreeMap::new(),
        };
        self.load_with_vars(&vars)
    }

    /// Finishes without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HeronConfig {
        self.config
    }

    fn load_with_vars(mut self, vars: &BTreeMap<String, String>) -> Result<HeronConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            for (key, value) in vars {
                self.apply_env_var(key, value, &prefix)?;
            }
        }
        self.config.validate()?;
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix) else {
            return Ok(());
        };
        let rest = rest.trim_start_matches('_');
        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["BINDING", "MAX_BODY_SIZE"] => config.binding.max_body_size = number(key, value)?,
            ["BINDING", "OFFLOAD_SYNC_HANDLERS"] => {
                config.binding.offload_sync_handlers = boolean(key, value)?;
            }
            ["BINDING", "WARN_UNUSED_PATH_KEYS"] => {
                config.binding.warn_unused_path_keys = boolean(key, value)?;
            }

            ["MULTIPART", "MAX_BODY_SIZE"] => config.multipart.max_body_size = number(key, value)?,
            ["MULTIPART", "MAX_FIELD_SIZE"] => config.multipart.max_field_size = number(key, value)?,
            ["MULTIPART", "MAX_FIELDS"] => config.multipart.max_fields = number(key, value)?,

            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }
            ["LOGGING", "INCLUDE_LOCATION"] => {
                config.logging.include_location = boolean(key, value)?;
            }
            ["LOGGING", "SERVICE_NAME"] => config.logging.service_name = value.to_string(),

            // Unrelated variables sharing the prefix.
            _ => {}
        }
        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<HeronConfig, ConfigError> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn boolean(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, HeronConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_toml_file() {
        let file = temp_file(
            ".toml",
            r#"
            [binding]
            max_body_size = 2048
            offload_sync_handlers = false

            [logging]
            service_name = "users"
            "#,
        );
        let loader = ConfigLoader::new().with_file(file.path()).unwrap();
        assert!(loader.file_loaded());
        let config = loader.load().unwrap();
        assert_eq!(config.binding.max_body_size, 2048);
        assert!(!config.binding.offload_sync_handlers);
        assert!(config.binding.warn_unused_path_keys);
        assert_eq!(config.logging.service_name, "users");
        assert_eq!(config.multipart, crate::MultipartSection::default());
    }

    #[test]
    fn test_loader_with_json_file() {
        let file = temp_file(".json", r#"{"multipart": {"max_fields": 8}}"#);
        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.multipart.max_fields, 8);
    }

    #[test]
    fn test_loader_unknown_extension() {
        let file = temp_file(".yaml", "binding: {}");
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_loader_file_with_unknown_field() {
        let file = temp_file(".toml", "[binding]\nmax_upload = 1\n");
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let err = ConfigLoader::new()
            .with_file("/nonexistent/heron.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/heron.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, HeronConfig::default());
    }

    #[test]
    fn test_loader_validates_file_values() {
        let file = temp_file(".toml", "[binding]\nmax_body_size = 0\n");
        let err = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[logging]\nlevel = \"loud\"\n", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.logging.level, "loud");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigLoader::new()
            .with_env_prefix("heron")
            .load_with_vars(&vars(&[
                ("HERON_BINDING__MAX_BODY_SIZE", "1048576"),
                ("HERON_BINDING__OFFLOAD_SYNC_HANDLERS", "off"),
                ("HERON_MULTIPART__MAX_FIELDS", "12"),
                ("HERON_LOGGING__FORMAT", "pretty"),
                ("HERON_LOGGING__INCLUDE_LOCATION", "yes"),
                ("HERON_UNRELATED", "ignored"),
            ]))
            .unwrap();
        assert_eq!(config.binding.max_body_size, 1_048_576);
        assert!(!config.binding.offload_sync_handlers);
        assert_eq!(config.multipart.max_fields, 12);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.include_location);
    }

    #[test]
    fn test_env_double_underscore_prefix() {
        let config = ConfigLoader::new()
            .with_env_prefix("HERON")
            .load_with_vars(&vars(&[("HERON__LOGGING__SERVICE_NAME", "orders")]))
            .unwrap();
        assert_eq!(config.logging.service_name, "orders");
    }

    #[test]
    fn test_env_overrides_file() {
        let file = temp_file(".toml", "[multipart]\nmax_fields = 4\n");
        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .with_env_prefix("HERON")
            .load_with_vars(&vars(&[("HERON_MULTIPART__MAX_FIELDS", "9")]))
            .unwrap();
        assert_eq!(config.multipart.max_fields, 9);
    }

    #[test]
    fn test_env_invalid_integer() {
        let err = ConfigLoader::new()
            .with_env_prefix("HERON")
            .load_with_vars(&vars(&[("HERON_MULTIPART__MAX_FIELD_SIZE", "big")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_env_ignored_without_prefix() {
        let config = ConfigLoader::new()
            .load_with_vars(&vars(&[("HERON_BINDING__MAX_BODY_SIZE", "0")]))
            .unwrap();
        assert_eq!(config, HeronConfig::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
