//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The named file does not exist.
    #[error("config file {path} does not exist")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("could not read config file {path}")]
    ReadError {
        /// Path that was read.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, or a TOML document with unknown fields.
    #[error("malformed TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Malformed JSON, or a JSON document with unknown fields.
    #[error("malformed JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Inline content in a format other than TOML or JSON.
    #[error("unsupported config format '{0}', expected toml or json")]
    UnsupportedFormat(String),

    /// A value parsed but failed validation.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `transfer.max_concurrent_chunks`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("cannot apply {var}: {reason}")]
    EnvParseError {
        /// The environment variable.
        var: String,
        /// Expected shape of the value.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// The offending field, for validation failures.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ConfigError::file_not_found("/etc/cirrus/cirrus.toml");
        assert_eq!(err.to_string(), "config file /etc/cirrus/cirrus.toml does not exist");

        let err = ConfigError::UnsupportedFormat("yaml".to_string());
        assert_eq!(
            err.to_string(),
            "unsupported config format 'yaml', expected toml or json"
        );

        let err = ConfigError::env_parse_error("CIRRUS__TRANSFER__BLOCKING_WAIT_MS", "expected integer");
        assert_eq!(
            err.to_string(),
            "cannot apply CIRRUS__TRANSFER__BLOCKING_WAIT_MS: expected integer"
        );
    }

    #[test]
    fn test_field() {
        let err = ConfigError::invalid_value("client.base_url", "missing scheme");
        assert_eq!(err.field(), Some("client.base_url"));
        assert_eq!(
            err.to_string(),
            "invalid configuration value for client.base_url: missing scheme"
        );
        assert_eq!(ConfigError::file_not_found("x.toml").field(), None);
    }

    #[test]
    fn test_read_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::read_error("/root/cirrus.toml", io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
