//! Configuration types.
//!
//! [`CirrusConfig`] is the root document. Each section converts into the
//! options type of the runtime crate it configures, so those crates never
//! see the file format.

use std::time::Duration;

use cirrus_client::{ClientOptions, DEFAULT_BLOCKING_WAIT};
use cirrus_pipeline::stages::RetryPolicy;
use cirrus_telemetry::{LogConfig, LogFormat};
use cirrus_transfer::{TransferOptions, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_CHUNKS};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Complete Cirrus configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer files and environment
/// variables on top of the defaults.
///
/// # Example
///
/// ```
/// use cirrus_config::CirrusConfig;
///
/// let config = CirrusConfig::default();
/// assert_eq!(config.transfer.max_concurrent_chunks, 4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CirrusConfig {
    /// Client façade settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Transfer manager settings.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CirrusConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `client.base_url` is set but is not an absolute http(s) URI
    /// - a retry delay bound is inverted
    /// - a transfer limit is zero
    /// - the log level is not a known level
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.client.base_url {
            validate_base_url(base_url)?;
        }

        let retry = &self.client.retry;
        if retry.enabled && retry.max_delay_ms < retry.base_delay_ms {
            return Err(ConfigError::invalid_value(
                "client.retry.max_delay_ms",
                "must not be smaller than base_delay_ms",
            ));
        }

        if self.transfer.max_chunk_size_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "transfer.max_chunk_size_bytes",
                "must be greater than zero",
            ));
        }
        if self.transfer.max_concurrent_chunks == 0 {
            return Err(ConfigError::invalid_value(
                "transfer.max_concurrent_chunks",
                "must be greater than zero",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "unknown level '{}', expected one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Development preset: debug level, pretty logs, no retry back-off.
    ///
    /// ```
    /// use cirrus_config::CirrusConfig;
    ///
    /// let config = CirrusConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config
    }

    /// Production preset: info level, JSON logs, a 60 second call timeout.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.client.timeout_ms = Some(60_000);
        config
    }

    /// Options for a [`PipelineClient`](cirrus_client::PipelineClient).
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        let client = &self.client;
        let mut options = ClientOptions::new(client.api_version.clone())
            .with_allowed_headers(client.allowed_headers.iter().cloned())
            .with_retry(client.retry.policy());
        if let Some(user_agent) = &client.user_agent {
            options = options.with_user_agent(user_agent.clone());
        }
        if let Some(timeout_ms) = client.timeout_ms {
            options = options.with_default_timeout(Duration::from_millis(timeout_ms));
        }
        options
    }

    /// Options for a [`TransferManager`](cirrus_transfer::TransferManager).
    #[must_use]
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions::new()
            .with_max_chunk_size(self.transfer.max_chunk_size_bytes)
            .with_max_concurrent_chunks(self.transfer.max_concurrent_chunks)
    }

    /// Deadline for each page fetched by a blocking page iterator.
    #[must_use]
    pub const fn blocking_wait(&self) -> Duration {
        Duration::from_millis(self.transfer.blocking_wait_ms)
    }

    /// Settings for [`init_logging`](cirrus_telemetry::init_logging).
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let base = match self.logging.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: self.logging.enabled,
            ..base.with_level(self.logging.level.to_ascii_lowercase())
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let uri: http::Uri = base_url
        .parse()
        .map_err(|e| ConfigError::invalid_value("client.base_url", format!("{e}")))?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        _ => {
            return Err(ConfigError::invalid_value(
                "client.base_url",
                format!("expected an http or https URL, got '{base_url}'"),
            ))
        }
    }
    if uri.host().is_none() {
        return Err(ConfigError::invalid_value(
            "client.base_url",
            format!("missing host in '{base_url}'"),
        ));
    }
    Ok(())
}

/// Client façade settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Service endpoint; relative request URLs are resolved against it.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Service API version sent with every request.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// User agent override.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Timeout applied to calls whose cancellation token carries none.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Header names logged without redaction, on top of the built-in list.
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_version: default_api_version(),
            user_agent: None,
            timeout_ms: None,
            allowed_headers: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_api_version() -> String {
    "2019-02-02".to_string()
}

/// Retry settings for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether the retry stage is installed. Off unless set.
    #[serde(default)]
    pub enabled: bool,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// The pipeline policy, or `None` when retries are disabled.
    #[must_use]
    pub fn policy(&self) -> Option<RetryPolicy> {
        self.enabled.then(|| RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        })
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    800
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

/// Transfer manager settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransferConfig {
    /// Largest chunk a blob is split into.
    #[serde(default = "default_max_chunk_size_bytes")]
    pub max_chunk_size_bytes: u64,

    /// Chunks in flight across all transfers.
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Deadline for each page fetched by a blocking page iterator.
    #[serde(default = "default_blocking_wait_ms")]
    pub blocking_wait_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: default_max_chunk_size_bytes(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            blocking_wait_ms: default_blocking_wait_ms(),
        }
    }
}

const fn default_max_chunk_size_bytes() -> u64 {
    DEFAULT_MAX_CHUNK_SIZE
}

const fn default_max_concurrent_chunks() -> usize {
    DEFAULT_MAX_CONCURRENT_CHUNKS
}

fn default_blocking_wait_ms() -> u64 {
    u64::try_from(DEFAULT_BLOCKING_WAIT.as_millis()).unwrap_or(u64::MAX)
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Whether a subscriber is installed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
