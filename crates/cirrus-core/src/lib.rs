//! # Cirrus Core
//!
//! Core types shared by every Cirrus crate.
//!
//! - [`Context`] - Immutable, structurally shared key/value chain threaded through a call
//! - [`CancellationToken`] - Cooperative cancellation with an optional timeout
//! - [`HttpRequest`] / [`HttpResponse`] - Values exchanged with the transport
//! - [`ClientError`] - Failure taxonomy (client, service, decoding, transport, cancelled)
//! - [`ClientRequestId`] - UUID v7 correlation id
//! - [`Transport`] - The seam to the byte-level HTTP client

#![doc(html_root_url = "https://docs.rs/cirrus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cancellation;
mod context;
mod error;
mod id;
mod message;
mod transport;

pub use cancellation::CancellationToken;
pub use context::{Context, ContextKey, ContextValue, DEFAULT_ALLOWED_STATUS_CODES};
pub use error::{ClientError, ClientResult, ErrorCategory, TransportErrorKind};
pub use id::ClientRequestId;
pub use message::{HttpRequest, HttpResponse};
pub use transport::{BoxFuture, Transport};

pub use ::http::{header, HeaderMap, Method, StatusCode, Uri};
pub use bytes::Bytes;
