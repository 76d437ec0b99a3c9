//! The transport seam.
//!
//! A [`Transport`] performs the byte-level HTTP exchange at the end of the
//! pipeline. Cirrus never retries inside a transport: each `send` is one
//! attempt, and retry policy lives in a pipeline stage.

use crate::error::ClientResult;
use crate::message::{HttpRequest, HttpResponse};
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes a single HTTP exchange.
///
/// Implementations map I/O failures to
/// [`ClientError::Transport`](crate::ClientError::Transport) with the
/// matching [`TransportErrorKind`](crate::TransportErrorKind) so callers can
/// tell transient failures apart.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and returns the response, whatever its status.
    fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, ClientResult<HttpResponse>>;
}
