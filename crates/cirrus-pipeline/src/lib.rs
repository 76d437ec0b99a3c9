//! # Cirrus Pipeline
//!
//! Ordered request/response pipeline for the Cirrus client.
//!
//! A [`Pipeline`] runs a request through an ordered list of [`Stage`]s and
//! then hands it to a [`Transport`]. Each stage may rewrite the request,
//! short-circuit with its own response, or post-process the response on the
//! way back up. Stages share per-call values through the
//! [`Context`](cirrus_core::Context) instead of knowing about each other.
//!
//! ```text
//! Request → ClientRequestId → Headers → Retry → Decompression → Logging → HMAC → Transport
//!                                                                                   ↓
//! Result  ← ─────────────────────────── (reverse order) ────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use cirrus_core::{Context, HttpRequest, Method};
//! use cirrus_pipeline::stages::{ClientRequestIdStage, LoggingStage};
//! use cirrus_pipeline::Pipeline;
//! use cirrus_test::{status_response, MockTransport};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(MockTransport::new().with_response(status_response(200)));
//! let pipeline = Pipeline::builder(transport)
//!     .add_stage(ClientRequestIdStage::new())
//!     .add_stage(LoggingStage::new())
//!     .build();
//!
//! let request = HttpRequest::parse(Method::GET, "https://example.com/items").unwrap();
//! let response = pipeline.run(request, Context::new()).await.unwrap();
//! assert_eq!(response.response.status.as_u16(), 200);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/cirrus-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod pipeline;
pub mod stage;
pub mod stages;
#[cfg(feature = "reqwest")]
pub mod transport;

pub use cirrus_core::{BoxFuture, Transport};
pub use pipeline::{BoxedStage, Pipeline, PipelineBuilder};
pub use stage::{Next, PipelineRequest, PipelineResponse, Stage};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
