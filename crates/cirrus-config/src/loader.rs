//! Layered configuration loading.
//!
//! Later layers override earlier ones:
//! 1. Defaults (or a preset)
//! 2. A TOML or JSON file, or an inline string
//! 3. Environment variables `PREFIX__SECTION__KEY`, optionally seeded from `.env`

use std::env;
use std::fs;
use std::path::Path;

use cirrus_telemetry::LogFormat;

use crate::{CirrusConfig, ConfigError};

/// Builds a [`CirrusConfig`] from layered sources.
///
/// # Example
///
/// ```no_run
/// use cirrus_config::ConfigLoader;
///
/// # fn main() -> Result<(), cirrus_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_optional_file("cirrus.toml")?
///     .with_dotenv()
///     .with_env_prefix("CIRRUS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: CirrusConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CirrusConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Reset to default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = CirrusConfig::default();
        self
    }

    /// Start from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = CirrusConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = CirrusConfig::production();
        self
    }

    /// Load a configuration file.
    ///
    /// The format is chosen by extension: `.json` is JSON, anything else is
    /// TOML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable or malformed.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let file_config = Self::parse_file(path, &content)?;
        self.merge_config(file_config);
        self.file_loaded = true;
        Ok(self)
    }

    /// Load a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown format or malformed content.
    ///
    /// # Example
    ///
    /// ```
    /// use cirrus_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [transfer]
    ///     max_concurrent_chunks = 8
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.transfer.max_concurrent_chunks, 8);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let file_config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::UnsupportedFormat(format.to_string())),
        };

        self.merge_config(file_config);
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// With prefix `CIRRUS`, `CIRRUS__TRANSFER__MAX_CONCURRENT_CHUNKS=8`
    /// overrides `transfer.max_concurrent_chunks`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load `.env` into the process environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        // Missing .env is fine.
        let _ = dotenvy::dotenv();
        self
    }

    /// Whether a configuration file has been loaded.
    #[must_use]
    pub const fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or the result
    /// fails validation.
    pub fn load(mut self) -> Result<CirrusConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix, env::vars())?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without env overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> CirrusConfig {
        self.config
    }

    fn parse_file(path: &Path, content: &str) -> Result<CirrusConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("toml");

        if extension.eq_ignore_ascii_case("json") {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(toml::from_str(content)?)
        }
    }

    fn merge_config(&mut self, other: CirrusConfig) {
        // Files are complete documents; absent sections fall back to defaults.
        self.config = other;
    }

    fn apply_env_overrides<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if key.starts_with(&marker) {
                self.apply_env_var(&key, &value, prefix)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let path = key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix("__"))
            .unwrap_or(key);
        let parts: Vec<&str> = path.split("__").collect();

        match parts.as_slice() {
            ["CLIENT", "BASE_URL"] => {
                self.config.client.base_url = non_empty(value);
            }
            ["CLIENT", "API_VERSION"] => {
                self.config.client.api_version = value.to_string();
            }
            ["CLIENT", "USER_AGENT"] => {
                self.config.client.user_agent = non_empty(value);
            }
            ["CLIENT", "TIMEOUT_MS"] => {
                self.config.client.timeout_ms = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(value.parse().map_err(|_| {
                        ConfigError::env_parse_error(key, "expected integer or 'none'")
                    })?)
                };
            }
            ["CLIENT", "ALLOWED_HEADERS"] => {
                self.config.client.allowed_headers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
            }

            ["CLIENT", "RETRY", "ENABLED"] => {
                self.config.client.retry.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["CLIENT", "RETRY", "MAX_RETRIES"] => {
                self.config.client.retry.max_retries = parse_int(key, value)?;
            }
            ["CLIENT", "RETRY", "BASE_DELAY_MS"] => {
                self.config.client.retry.base_delay_ms = parse_int(key, value)?;
            }
            ["CLIENT", "RETRY", "MAX_DELAY_MS"] => {
                self.config.client.retry.max_delay_ms = parse_int(key, value)?;
            }

            ["TRANSFER", "MAX_CHUNK_SIZE_BYTES"] => {
                self.config.transfer.max_chunk_size_bytes = parse_int(key, value)?;
            }
            ["TRANSFER", "MAX_CONCURRENT_CHUNKS"] => {
                self.config.transfer.max_concurrent_chunks = parse_int(key, value)?;
            }
            ["TRANSFER", "BLOCKING_WAIT_MS"] => {
                self.config.transfer.blocking_wait_ms = parse_int(key, value)?;
            }

            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = value
                    .parse::<LogFormat>()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?;
            }

            // Unknown keys are ignored.
            _ => {}
        }

        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, CirrusConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"client": {"base_url": "https://photos.example.com", "timeout_ms": 5000}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(
            config.client.base_url.as_deref(),
            Some("https://photos.example.com")
        );
        assert_eq!(config.client.timeout_ms, Some(5000));
        assert_eq!(config.client.api_version, "2019-02-02");
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let toml = r#"
            [transfer]
            max_chunk_size = 10
        "#;
        let result = ConfigLoader::new().with_string(toml, "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        let result = ConfigLoader::new().with_string("", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/cirrus.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let loader = ConfigLoader::new()
            .with_optional_file("/nonexistent/cirrus.toml")
            .unwrap();
        assert!(!loader.file_loaded());
        assert_eq!(loader.load().unwrap(), CirrusConfig::default());
    }

    #[test]
    fn test_load_validates() {
        let toml = r#"
            [client]
            base_url = "not a url"
        "#;
        let loader = ConfigLoader::new().with_string(toml, "toml").unwrap();
        assert!(matches!(
            loader.load(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let unvalidated = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(unvalidated.client.base_url.as_deref(), Some("not a url"));
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_overrides(
                "CIRRUS",
                vars(&[
                    ("CIRRUS__CLIENT__BASE_URL", "https://blobs.example.com"),
                    ("CIRRUS__CLIENT__TIMEOUT_MS", "2500"),
                    ("CIRRUS__CLIENT__ALLOWED_HEADERS", "x-ms-blob-type, etag"),
                    ("CIRRUS__CLIENT__RETRY__MAX_RETRIES", "7"),
                    ("CIRRUS__TRANSFER__MAX_CONCURRENT_CHUNKS", "16"),
                    ("CIRRUS__LOGGING__FORMAT", "Pretty"),
                    ("OTHER__TRANSFER__MAX_CONCURRENT_CHUNKS", "1"),
                    ("PATH", "/usr/bin"),
                ]),
            )
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(
            config.client.base_url.as_deref(),
            Some("https://blobs.example.com")
        );
        assert_eq!(config.client.timeout_ms, Some(2500));
        assert_eq!(config.client.allowed_headers, vec!["x-ms-blob-type", "etag"]);
        assert_eq!(config.client.retry.max_retries, 7);
        assert_eq!(config.transfer.max_concurrent_chunks, 16);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_timeout_none() {
        let mut loader = ConfigLoader::new();
        loader.config.client.timeout_ms = Some(10);
        loader
            .apply_env_var("CIRRUS__CLIENT__TIMEOUT_MS", "none", "CIRRUS")
            .unwrap();
        assert_eq!(loader.config.client.timeout_ms, None);
    }

    #[test]
    fn test_env_parse_errors() {
        let mut loader = ConfigLoader::new();
        assert!(matches!(
            loader.apply_env_var("CIRRUS__TRANSFER__BLOCKING_WAIT_MS", "soon", "CIRRUS"),
            Err(ConfigError::EnvParseError { .. })
        ));
        assert!(loader
            .apply_env_var("CIRRUS__LOGGING__ENABLED", "maybe", "CIRRUS")
            .is_err());
        assert!(loader
            .apply_env_var("CIRRUS__LOGGING__FORMAT", "xml", "CIRRUS")
            .is_err());
    }

    #[test]
    fn test_env_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("CIRRUS__CLIENT__COLOR", "blue", "CIRRUS")
            .unwrap();
        assert_eq!(loader.load_unvalidated(), CirrusConfig::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
