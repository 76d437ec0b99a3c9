//! Core stage trait and types.
//!
//! This module defines the [`Stage`] trait that every pipeline stage
//! implements. A stage sees the request on the way down, may call the rest
//! of the chain through [`Next`], and sees the response (or failure) on the
//! way back up.
//!
//! # Example
//!
//! ```
//! use cirrus_pipeline::{BoxFuture, Next, PipelineRequest, PipelineResponse, Stage};
//! use cirrus_core::ClientResult;
//!
//! struct Timing;
//!
//! impl Stage for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         request: PipelineRequest,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, ClientResult<PipelineResponse>> {
//!         Box::pin(async move {
//!             let started = std::time::Instant::now();
//!             let response = next.run(request).await;
//!             tracing::debug!(elapsed = ?started.elapsed(), "call finished");
//!             response
//!         })
//!     }
//! }
//! ```

use cirrus_core::{
    BoxFuture, ClientError, ClientResult, Context, HttpRequest, HttpResponse, Transport,
};
use std::sync::Arc;

/// A request travelling down the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// The HTTP request; stages may rewrite it.
    pub request: HttpRequest,
    /// Out-of-band values for this call.
    pub context: Context,
}

impl PipelineRequest {
    /// Pairs a request with its context.
    #[must_use]
    pub fn new(request: HttpRequest, context: Context) -> Self {
        Self { request, context }
    }
}

/// A response travelling back up the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    /// The request as the transport sent it.
    pub request: HttpRequest,
    /// The transport's response; stages may rewrite it.
    pub response: HttpResponse,
    /// The context, possibly extended by stages on the way up.
    pub context: Context,
}

impl PipelineResponse {
    /// Returns the body callers should decode.
    ///
    /// Prefers the payload a stage stored under
    /// [`ContextKey::DeserializedData`](cirrus_core::ContextKey::DeserializedData)
    /// over the raw response body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        self.context
            .deserialized_data()
            .map_or(&self.response.body[..], |data| &data[..])
    }
}

/// A single unit of request/response processing.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once, unless it exists to recover
///   from downstream failures (retry)
/// - A stage that does not call `next` short-circuits the chain
/// - A stage carries configuration only; per-call state lives in the
///   [`Context`]
pub trait Stage: Send + Sync + 'static {
    /// Returns the name of this stage, used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request through this stage.
    fn process<'a>(
        &'a self,
        request: PipelineRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, ClientResult<PipelineResponse>>;
}

/// Invoker for the remainder of the chain.
///
/// `Next` is `Copy`: a retry stage may run the remainder more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Stage>], transport: &'a dyn Transport) -> Self {
        Self { stages, transport }
    }

    /// Number of stages left before the transport.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }

    /// Invokes the next stage, or the transport once no stages remain.
    ///
    /// Fails with [`ClientError::Cancelled`] without going further if the
    /// context's cancellation token has fired.
    pub async fn run(self, request: PipelineRequest) -> ClientResult<PipelineResponse> {
        if let Some(token) = request.context.cancellation_token() {
            if token.is_cancelled() {
                return Err(cancelled(token.is_timed_out()));
            }
        }

        match self.stages.split_first() {
            Some((stage, rest)) => stage.process(request, Next::new(rest, self.transport)).await,
            None => self.send(request).await,
        }
    }

    async fn send(self, request: PipelineRequest) -> ClientResult<PipelineResponse> {
        let PipelineRequest { request, context } = request;

        let response = match context.cancellation_token() {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(cancelled(token.is_timed_out())),
                    result = self.transport.send(request.clone()) => result?,
                }
            }
            None => self.transport.send(request.clone()).await?,
        };

        Ok(PipelineResponse {
            request,
            response,
            context,
        })
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

fn cancelled(timed_out: bool) -> ClientError {
    if timed_out {
        ClientError::cancelled("request timed out")
    } else {
        ClientError::cancelled("request was cancelled")
    }
}
