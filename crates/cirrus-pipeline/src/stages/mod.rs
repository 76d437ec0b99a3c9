//! Built-in pipeline stages.
//!
//! | Stage                     | Purpose                                           |
//! |---------------------------|---------------------------------------------------|
//! | [`ClientRequestIdStage`]  | Stamp `x-ms-client-request-id` (UUID v7)          |
//! | [`HeadersStage`]          | Inject default headers without overwriting        |
//! | [`RetryStage`]            | Retry transient failures with capped back-off     |
//! | [`DecompressionStage`]    | Negotiate and inflate gzip/deflate bodies         |
//! | [`LoggingStage`]          | Log requests and responses with header redaction  |
//! | [`HmacAuthenticationStage`] | Sign the final request with HMAC-SHA256         |
//!
//! A typical order is the one above: the signing stage goes last so that it
//! sees the final headers and body.

#[cfg(feature = "decompression")]
pub mod decompression;
pub mod headers;
pub mod hmac;
pub mod logging;
pub mod request_id;
pub mod retry;

#[cfg(feature = "decompression")]
pub use decompression::{DecompressionStage, MAX_INFLATED_BYTES};
pub use headers::HeadersStage;
pub use hmac::HmacAuthenticationStage;
pub use logging::LoggingStage;
pub use request_id::ClientRequestIdStage;
pub use retry::{RetryPolicy, RetryStage};
