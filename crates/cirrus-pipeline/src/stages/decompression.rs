//! Response decompression stage.
//!
//! Advertises `accept-encoding: gzip, deflate` on outgoing requests and
//! inflates compressed response bodies. The inflated bytes are stored under
//! [`ContextKey::DeserializedData`](cirrus_core::ContextKey::DeserializedData),
//! which the client prefers over the raw body; the raw response is left
//! untouched.
//!
//! Inflation is capped at [`MAX_INFLATED_BYTES`] by default. A body that
//! fails to inflate is a decoding error only when its status would pass the
//! status-code gate; otherwise the raw response is passed on so the client
//! reports the service error.

use crate::stage::{Next, PipelineRequest, PipelineResponse, Stage};
use bytes::Bytes;
use cirrus_core::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING};
use cirrus_core::{BoxFuture, ClientError, ClientResult};
use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;

/// Default upper bound on an inflated body (64 MiB).
pub const MAX_INFLATED_BYTES: u64 = 64 * 1024 * 1024;

/// Content encodings this stage can inflate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Gzip (RFC 1952).
    Gzip,
    /// Zlib-wrapped deflate (RFC 1950), as sent for `deflate`.
    Deflate,
}

impl Encoding {
    /// Parses a `content-encoding` value.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }

    /// Inflates `body`, failing if the result exceeds `limit` bytes.
    pub fn decode(self, body: &[u8], limit: u64) -> ClientResult<Bytes> {
        let capacity = body
            .len()
            .saturating_mul(4)
            .min(usize::try_from(limit).unwrap_or(usize::MAX));
        let mut decoded = Vec::with_capacity(capacity);
        let bounded = limit.saturating_add(1);
        let result = match self {
            Self::Gzip => GzDecoder::new(body).take(bounded).read_to_end(&mut decoded),
            Self::Deflate => ZlibDecoder::new(body).take(bounded).read_to_end(&mut decoded),
        };
        result.map_err(|e| {
            ClientError::decoding_with_source(format!("failed to inflate {self:?} response body"), e)
        })?;
        if decoded.len() as u64 > limit {
            return Err(ClientError::decoding(format!(
                "{self:?} response body inflates past {limit} bytes"
            )));
        }
        Ok(Bytes::from(decoded))
    }
}

/// Stage that negotiates and inflates compressed responses.
#[derive(Debug, Clone)]
pub struct DecompressionStage {
    max_inflated: u64,
}

impl Default for DecompressionStage {
    fn default() -> Self {
        Self {
            max_inflated: MAX_INFLATED_BYTES,
        }
    }
}

impl DecompressionStage {
    /// Creates the stage with the default inflation cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest inflated body accepted, in bytes.
    #[must_use]
    pub const fn with_max_inflated(mut self, bytes: u64) -> Self {
        self.max_inflated = bytes;
        self
    }
}

impl Stage for DecompressionStage {
    fn name(&self) -> &'static str {
        "decompression"
    }

    fn process<'a>(
        &'a self,
        mut request: PipelineRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, ClientResult<PipelineResponse>> {
        Box::pin(async move {
            request
                .request
                .headers
                .entry(ACCEPT_ENCODING)
                .or_insert(HeaderValue::from_static("gzip, deflate"));

            let mut response = next.run(request).await?;

            let encoding = response
                .response
                .headers
                .get(CONTENT_ENCODING)
                .and_then(|value| value.to_str().ok())
                .and_then(Encoding::from_header);

            let Some(encoding) = encoding else {
                return Ok(response);
            };

            let status = response.response.status.as_u16();
            match encoding.decode(&response.response.body, self.max_inflated) {
                Ok(decoded) => {
                    tracing::debug!(
                        stage = "decompression",
                        encoding = ?encoding,
                        compressed = response.response.body.len(),
                        decoded = decoded.len(),
                        "inflated response body"
                    );
                    response.context = response.context.with_deserialized_data(decoded);
                }
                Err(error) if response.context.is_status_allowed(status) => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        stage = "decompression",
                        status,
                        error = %error,
                        "leaving undecodable error response body as received"
                    );
                }
            }

            Ok(response)
        })
    }
}
