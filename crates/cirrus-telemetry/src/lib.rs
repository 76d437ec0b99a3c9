//! # Cirrus Telemetry
//!
//! Logging setup for applications built on Cirrus.
//!
//! Every Cirrus crate logs through `tracing` with structured fields; this
//! crate installs a `tracing-subscriber` that renders those events as JSON
//! (production) or pretty text (development).
//!
//! # Example
//!
//! ```rust,no_run
//! use cirrus_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development()).expect("logging already initialized");
//! tracing::info!(transfer_id = "0190...", "transfer enqueued");
//! ```

#![doc(html_root_url = "https://docs.rs/cirrus-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
