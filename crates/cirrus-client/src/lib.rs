//! # Cirrus Client
//!
//! Client façade over the Cirrus pipeline.
//!
//! This crate provides:
//!
//! - [`PipelineClient`]: URL templating, request construction and the
//!   status-code gate that decides whether a call succeeded
//! - [`PagedCollection`]: lazy, append-only paging over list endpoints
//! - [`BlockingPages`]: a bounded-wait blocking iterator over pages
//! - [`CompletionQueue`]: the serial queue `run_then` completions run on
//!
//! ## Example
//!
//! ```
//! use cirrus_client::{ClientOptions, PipelineClient};
//! use cirrus_core::{Context, Method};
//! use cirrus_test::{json_response, MockTransport};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new().with_response(json_response(200, &json!({"id": "t1"})));
//! let client = PipelineClient::builder("https://chat.example.com", Arc::new(transport))
//!     .options(ClientOptions::new("2021-03-07"))
//!     .build()
//!     .unwrap();
//!
//! let url = client.format("/threads/{threadId}", [("threadId", "t1")]).unwrap();
//! let request = client
//!     .request(Method::GET, &url, &BTreeMap::new(), Default::default(), None)
//!     .unwrap();
//! let thread: serde_json::Value = client.run_json(request, Context::new()).await.unwrap();
//! assert_eq!(thread["id"], "t1");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/cirrus-client/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod blocking;
pub mod client;
pub mod completion;
pub mod options;
pub mod paged;

pub use blocking::{BlockingPages, DEFAULT_BLOCKING_WAIT};
pub use client::{ClientBuilder, ClientResponse, PipelineClient, DEFAULT_ALLOWED_STATUS_CODES};
pub use completion::CompletionQueue;
pub use options::ClientOptions;
pub use paged::{PagedCodingKeys, PagedCollection, PagedCollectionDelegate};
