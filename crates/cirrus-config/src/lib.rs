//! Typed configuration for Cirrus.
//!
//! This crate loads the settings shared by the client façade, the transfer
//! manager and logging, with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides, optionally seeded from `.env`
//! - Strict parsing (unknown fields are rejected)
//! - Validation before the configuration is handed out
//!
//! # Example
//!
//! ```no_run
//! use cirrus_config::ConfigLoader;
//!
//! # fn main() -> Result<(), cirrus_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("cirrus.toml")?
//!     .with_env_prefix("CIRRUS")
//!     .load()?;
//!
//! let client_options = config.client_options();
//! let transfer_options = config.transfer_options();
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [client]
//! base_url = "https://account.blob.core.windows.net"
//! api_version = "2019-02-02"
//! timeout_ms = 30000
//! allowed_headers = ["x-ms-blob-type"]
//!
//! [client.retry]
//! enabled = true
//! max_retries = 3
//! base_delay_ms = 800
//! max_delay_ms = 60000
//!
//! [transfer]
//! max_chunk_size_bytes = 4194303
//! max_concurrent_chunks = 4
//! blocking_wait_ms = 30000
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values are overridden with `PREFIX__SECTION__KEY`, for example
//! `CIRRUS__CLIENT__RETRY__MAX_RETRIES=5` or `CIRRUS__LOGGING__FORMAT=pretty`.

#![doc(html_root_url = "https://docs.rs/cirrus-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{CirrusConfig, ClientConfig, LoggingConfig, RetryConfig, TransferConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;

pub use cirrus_telemetry::LogFormat;
