//! HMAC request signing.
//!
//! Signs every outgoing request with a shared access key:
//!
//! ```text
//! content-hash   = base64(SHA256(body))
//! string-to-sign = METHOD \n content-length \n content-type \n content-hash \n date \n path-and-query
//! signature      = base64(HMAC-SHA256(base64-decode(access-key), string-to-sign))
//! ```
//!
//! and sets `date`, `host`, `x-ms-content-sha256` and
//! `authorization: HMAC-SHA256 SignedHeaders=date;host;x-ms-content-sha256&Signature=<signature>`.
//!
//! The signature covers the final body bytes, so this stage must be added
//! after every stage that rewrites the body.

use crate::stage::{Next, PipelineRequest, PipelineResponse, Stage};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use cirrus_core::{BoxFuture, ClientError, ClientResult, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Header carrying the body hash.
pub const CONTENT_HASH_HEADER: &str = "x-ms-content-sha256";

/// Signed header list, in signing order.
pub const SIGNED_HEADERS: &str = "date;host;x-ms-content-sha256";

/// Source of the signing timestamp.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Stage that signs requests with an HMAC-SHA256 access key.
///
/// The key is kept as supplied and decoded when signing, so a malformed
/// key fails the call with a client error before the transport is reached.
///
/// # Example
///
/// ```
/// use cirrus_pipeline::stages::HmacAuthenticationStage;
/// use cirrus_core::{HttpRequest, Method};
/// use chrono::{TimeZone, Utc};
///
/// let stage = HmacAuthenticationStage::new("c2VjcmV0");
/// let mut request = HttpRequest::parse(Method::GET, "https://example.com/items").unwrap();
/// stage.sign_at(&mut request, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()).unwrap();
///
/// assert_eq!(request.header("date"), Some("Tue, 02 Jan 2024 03:04:05 GMT"));
/// assert!(request.header("authorization").unwrap().starts_with("HMAC-SHA256 "));
/// ```
#[derive(Clone)]
pub struct HmacAuthenticationStage {
    access_key: String,
    clock: Clock,
}

impl HmacAuthenticationStage {
    /// Creates a stage signing with `access_key` (base64) at the current time.
    #[must_use]
    pub fn new(access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the timestamp source.
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Signs `request` in place using `date` as the signing time.
    ///
    /// Deterministic: the same key, request and date always produce the
    /// same headers.
    pub fn sign_at(&self, request: &mut HttpRequest, date: DateTime<Utc>) -> ClientResult<()> {
        let key = BASE64
            .decode(self.access_key.trim())
            .map_err(|e| ClientError::client_with_source("access key is not valid base64", e))?;

        let host = request
            .uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .ok_or_else(|| ClientError::client("request URL has no host to sign"))?;

        let content_hash = BASE64.encode(Sha256::digest(&request.body));
        let date = date.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_type = request.header("content-type").unwrap_or_default();

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method,
            request.body.len(),
            content_type,
            content_hash,
            date,
            request.path_and_query(),
        );

        let signature = signature(&key, &string_to_sign)?;

        request.set_header("date", &date)?;
        request.set_header("host", &host)?;
        request.set_header(CONTENT_HASH_HEADER, &content_hash)?;
        request.set_header(
            "authorization",
            &format!("HMAC-SHA256 SignedHeaders={SIGNED_HEADERS}&Signature={signature}"),
        )?;
        Ok(())
    }
}

/// base64(HMAC-SHA256(key, string_to_sign))
fn signature(key: &[u8], string_to_sign: &str) -> ClientResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ClientError::client_with_source("access key is unusable", e))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

impl Stage for HmacAuthenticationStage {
    fn name(&self) -> &'static str {
        "hmac_authentication"
    }

    fn process<'a>(
        &'a self,
        mut request: PipelineRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, ClientResult<PipelineResponse>> {
        Box::pin(async move {
            self.sign_at(&mut request.request, (self.clock)())?;
            next.run(request).await
        })
    }
}

impl std::fmt::Debug for HmacAuthenticationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacAuthenticationStage")
            .field("access_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}
