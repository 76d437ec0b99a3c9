//! # Cirrus
//!
//! **HTTP client pipeline for cloud service SDKs**
//!
//! Cirrus provides the plumbing a service client is built from:
//!
//! - **Request pipeline**: an ordered chain of stages (request ids, default
//!   headers, retry, decompression, logging, HMAC signing) ending at a
//!   pluggable transport
//! - **Client façade**: URL templating, request construction and a
//!   per-call status-code gate
//! - **Paged collections**: lazy, single-flight paging over list endpoints
//! - **Resumable transfers**: chunked blob transfers with pause, resume,
//!   cancel and monotonic progress
//! - **Configuration and logging**: layered config files and a `tracing`
//!   subscriber
//!
//! ## Architecture
//!
//! ```text
//! PipelineClient ─► ClientRequestId ─► Headers ─► Retry ─► Decompression
//!                                                               │
//!        Transport ◄─ HmacAuthentication ◄─ Logging ◄─ custom ◄─┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cirrus::prelude::*;
//!
//! let config = ConfigLoader::new().with_env_prefix("CIRRUS").load()?;
//! let client = PipelineClient::builder("https://account.blob.core.windows.net", transport)
//!     .options(config.client_options())
//!     .access_key(access_key)
//!     .build()?;
//! ```

#![doc(html_root_url = "https://docs.rs/cirrus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use cirrus_core as core;

// Re-export pipeline and stages
pub use cirrus_pipeline as pipeline;

// Re-export client façade and paging
pub use cirrus_client as client;

// Re-export transfer manager
pub use cirrus_transfer as transfer;

// Re-export configuration
pub use cirrus_config as config;

// Re-export logging setup
pub use cirrus_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use cirrus::prelude::*;
///
/// let context = Context::new().with_allowed_status_codes([200, 201]);
/// assert!(context.allowed_status_codes().unwrap().contains(&201));
/// ```
pub mod prelude {
    pub use cirrus_core::{
        CancellationToken, ClientError, ClientResult, Context, ContextKey, HttpRequest,
        HttpResponse, Method, Transport, TransportErrorKind,
    };

    pub use cirrus_pipeline::stages::{HmacAuthenticationStage, RetryPolicy};
    pub use cirrus_pipeline::{Next, Pipeline, Stage};

    pub use cirrus_client::{
        BlockingPages, ClientOptions, PagedCodingKeys, PagedCollection, PipelineClient,
    };

    pub use cirrus_transfer::{
        ChunkHandler, ClientRegistry, RangeDownloadHandler, Transfer, TransferDelegate,
        TransferId, TransferManager, TransferOptions, TransferProgress, TransferState,
    };

    pub use cirrus_config::{CirrusConfig, ConfigLoader};

    pub use cirrus_telemetry::{init_logging, LogConfig};
}
