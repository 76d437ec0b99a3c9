//! # Cirrus Test
//!
//! Test utilities for Cirrus, providing a scripted in-memory [`Transport`]
//! so pipelines, clients and transfers can be exercised without a network.
//!
//! ## Example
//!
//! ```
//! use cirrus_test::{json_response, MockTransport};
//! use serde_json::json;
//!
//! let transport = MockTransport::new()
//!     .with_response(json_response(200, &json!({"value": []})))
//!     .with_response(json_response(404, &json!({"error": "gone"})));
//! assert_eq!(transport.pending(), 2);
//! ```
//!
//! [`Transport`]: cirrus_core::Transport

#![doc(html_root_url = "https://docs.rs/cirrus-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod response;
mod transport;

pub use response::{json_response, status_response, text_response};
pub use transport::{MockTransport, Responder};
