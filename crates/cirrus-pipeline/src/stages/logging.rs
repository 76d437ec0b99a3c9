//! Request/response logging stage.
//!
//! Emits one `tracing` event per outgoing request and one per outcome. Header
//! values are logged only for names on the allow list; every other value is
//! replaced with `REDACTED`. The allow list is the stage's configured list
//! plus any names in the call's
//! [`ContextKey::AllowedHeaders`](cirrus_core::ContextKey::AllowedHeaders).
//!
//! ## Fields
//!
//! - `request_id` - the `x-ms-client-request-id` header, when present
//! - `method`, `url`
//! - `status`, `duration_ms` - on response
//! - `stage` - always `logging`

use crate::stage::{Next, PipelineRequest, PipelineResponse, Stage};
use cirrus_core::{BoxFuture, ClientRequestId, ClientResult, HeaderMap};
use std::collections::HashSet;
use std::time::Instant;

/// Placeholder logged in place of a disallowed header value.
pub const REDACTED: &str = "REDACTED";

/// Header names logged verbatim by default.
pub const DEFAULT_ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "cache-control",
    "connection",
    "content-length",
    "content-range",
    "content-type",
    "date",
    "etag",
    "expires",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-unmodified-since",
    "last-modified",
    "pragma",
    "request-id",
    "retry-after",
    "server",
    "traceparent",
    "transfer-encoding",
    "user-agent",
    "x-ms-client-request-id",
    "x-ms-range",
    "x-ms-request-id",
    "x-ms-return-client-request-id",
    "x-ms-version",
];

/// Stage that logs requests and responses with header redaction.
#[derive(Debug, Clone)]
pub struct LoggingStage {
    allowed_headers: HashSet<String>,
}

impl LoggingStage {
    /// Creates a stage with the default allow list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed_headers: DEFAULT_ALLOWED_HEADERS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
        }
    }

    /// Adds header names to the allow list.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_headers
            .extend(names.into_iter().map(|name| name.as_ref().to_ascii_lowercase()));
        self
    }

    /// Returns true if `name` is logged verbatim, before per-call additions.
    #[must_use]
    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed_headers.contains(&name.to_ascii_lowercase())
    }

    /// Renders `headers` for logging, redacting disallowed values.
    ///
    /// `extra` holds per-call allowed names, already lowercased.
    #[must_use]
    pub fn redact(&self, headers: &HeaderMap, extra: &[String]) -> String {
        let mut rendered: Vec<String> = headers
            .iter()
            .map(|(name, value)| {
                let name = name.as_str();
                let allowed = self.allowed_headers.contains(name)
                    || extra.iter().any(|allowed| allowed == name);
                let value = if allowed {
                    value.to_str().unwrap_or("<binary>")
                } else {
                    REDACTED
                };
                format!("{name}: {value}")
            })
            .collect();
        rendered.sort();
        rendered.join(", ")
    }
}

impl Default for LoggingStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        mut request: PipelineRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, ClientResult<PipelineResponse>> {
        Box::pin(async move {
            let started = match request.context.request_start_time() {
                Some(started) => started,
                None => {
                    let now = Instant::now();
                    request.context = request.context.with_request_start_time(now);
                    now
                }
            };

            let extra = request.context.allowed_headers().cloned().unwrap_or_default();
            let request_id = request
                .request
                .header(ClientRequestId::HEADER)
                .unwrap_or("-")
                .to_string();

            tracing::info!(
                stage = "logging",
                request_id = %request_id,
                method = %request.request.method,
                url = %request.request.uri,
                headers = %self.redact(&request.request.headers, &extra),
                "sending request"
            );

            let result = next.run(request).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(response) => {
                    tracing::info!(
                        stage = "logging",
                        request_id = %request_id,
                        status = response.response.status.as_u16(),
                        duration_ms,
                        headers = %self.redact(&response.response.headers, &extra),
                        "received response"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        stage = "logging",
                        request_id = %request_id,
                        duration_ms,
                        error = %error,
                        "request failed"
                    );
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipeline;
    use cirrus_core::header::{HeaderName, HeaderValue};
    use cirrus_core::{Context, HttpRequest, Method};
    use cirrus_test::{status_response, MockTransport};
    use std::sync::Arc;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_redacts_unknown_headers() {
        let stage = LoggingStage::new();
        let rendered = stage.redact(
            &headers(&[("content-type", "application/json"), ("authorization", "secret")]),
            &[],
        );
        assert_eq!(rendered, "authorization: REDACTED, content-type: application/json");
    }

    #[test]
    fn test_per_call_allow_list() {
        let stage = LoggingStage::new();
        let rendered = stage.redact(
            &headers(&[("x-custom", "visible")]),
            &["x-custom".to_string()],
        );
        assert_eq!(rendered, "x-custom: visible");
    }

    #[test]
    fn test_configured_allow_list_is_case_insensitive() {
        let stage = LoggingStage::new().allow_headers(["X-Tenant"]);
        assert!(stage.is_allowed("x-tenant"));
        assert!(stage.is_allowed("X-TENANT"));
        assert!(!stage.is_allowed("authorization"));
    }

    #[tokio::test]
    async fn test_records_start_time() {
        let transport = Arc::new(MockTransport::new().with_response(status_response(200)));
        let pipeline = Pipeline::builder(transport).add_stage(LoggingStage::new()).build();

        let request = HttpRequest::parse(Method::GET, "https://example.com").unwrap();
        let response = pipeline.run(request, Context::new()).await.unwrap();
        assert!(response.context.request_start_time().is_some());
    }

    #[tokio::test]
    async fn test_keeps_existing_start_time() {
        let transport = Arc::new(MockTransport::new().with_response(status_response(200)));
        let pipeline = Pipeline::builder(transport).add_stage(LoggingStage::new()).build();
        let started = Instant::now();

        let request = HttpRequest::parse(Method::GET, "https://example.com").unwrap();
        let response = pipeline
            .run(request, Context::new().with_request_start_time(started))
            .await
            .unwrap();
        assert_eq!(response.context.request_start_time(), Some(started));
    }

    #[tokio::test]
    async fn test_failure_passes_through() {
        let pipeline = Pipeline::builder(Arc::new(MockTransport::new()))
            .add_stage(LoggingStage::new())
            .build();

        let request = HttpRequest::parse(Method::GET, "https://example.com").unwrap();
        assert!(pipeline.run(request, Context::new()).await.is_err());
    }
}
