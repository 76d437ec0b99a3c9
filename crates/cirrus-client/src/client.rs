//! Pipeline client façade.
//!
//! [`PipelineClient`] wraps a [`Pipeline`] with a base URL and shared
//! options. It builds ready-to-send requests from URL templates and turns
//! raw pipeline results into success or failure through the status-code
//! gate: a response whose status is not in the call's allowed set (default
//! `{200}`) becomes a [`ClientError::Service`]. Nothing else in Cirrus
//! decides whether a call succeeded.

use crate::completion::CompletionQueue;
use crate::options::ClientOptions;
use bytes::Bytes;
use cirrus_core::{
    ClientError, ClientResult, Context, HeaderMap, HttpRequest, Method, StatusCode, Transport, Uri,
};
use cirrus_pipeline::stages::{
    ClientRequestIdStage, DecompressionStage, HeadersStage, HmacAuthenticationStage,
    LoggingStage, RetryStage,
};
use cirrus_pipeline::{BoxedStage, Pipeline};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use cirrus_core::DEFAULT_ALLOWED_STATUS_CODES;

/// A successful call.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// Response status, always within the allowed set.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// The decoded payload if a stage produced one, else the raw body.
    pub body: Bytes,
    /// The request as it was sent.
    pub request: HttpRequest,
    /// The call's context after every stage ran.
    pub context: Context,
}

impl ClientResponse {
    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::decoding_with_source("response body has unexpected shape", e))
    }
}

struct ClientInner {
    base_url: String,
    pipeline: Pipeline,
    options: ClientOptions,
    completions: CompletionQueue,
}

/// Client façade over a [`Pipeline`].
///
/// Cheap to clone; clones share the pipeline, options and completion queue.
///
/// # Example
///
/// ```
/// use cirrus_client::{ClientOptions, PipelineClient};
/// use cirrus_test::MockTransport;
/// use std::sync::Arc;
///
/// let client = PipelineClient::new(
///     "https://chat.example.com",
///     Arc::new(MockTransport::new()),
///     Vec::new(),
///     ClientOptions::new("2021-03-07"),
/// )
/// .unwrap();
///
/// let url = client.format("/threads/{threadId}/messages", [("threadId", "t1")]).unwrap();
/// assert_eq!(url, "https://chat.example.com/threads/t1/messages");
/// ```
#[derive(Clone)]
pub struct PipelineClient {
    inner: Arc<ClientInner>,
}

impl PipelineClient {
    /// Creates a client running `stages`, in order, in front of `transport`.
    ///
    /// A trailing `/` is added to `base_url` when missing.
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        stages: Vec<BoxedStage>,
        options: ClientOptions,
    ) -> ClientResult<Self> {
        let mut base_url = base_url.into();
        validate_absolute(&base_url)?;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let pipeline = Pipeline::builder(transport).add_stages(stages).build();
        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                pipeline,
                options,
                completions: CompletionQueue::new(),
            }),
        })
    }

    /// Creates a builder that assembles the standard stage stack.
    #[must_use]
    pub fn builder(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder::new(base_url, transport)
    }

    /// The base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The client options.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// The underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// The queue [`run_then`](Self::run_then) completions run on.
    #[must_use]
    pub fn completion_queue(&self) -> &CompletionQueue {
        &self.inner.completions
    }

    /// Resolves a URL template against the base URL.
    ///
    /// - A single leading `/` is dropped so the template is relative to the
    ///   base URL's path.
    /// - Templates that already start with the base URL, or that are
    ///   absolute `http(s)` URLs, are used as-is.
    /// - Every `{name}` placeholder is replaced by its value.
    ///
    /// Fails with a client error if the result is not a valid absolute URL.
    pub fn format<I, K, V>(&self, template: &str, substitutions: I) -> ClientResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let template = template.strip_prefix('/').unwrap_or(template);
        let mut url = if template.starts_with(self.base_url()) || is_absolute_http(template) {
            template.to_string()
        } else {
            format!("{}{template}", self.base_url())
        };

        for (name, value) in substitutions {
            url = url.replace(&format!("{{{}}}", name.as_ref()), value.as_ref());
        }

        validate_absolute(&url)?;
        Ok(url)
    }

    /// Builds a request, appending `query_params` percent-encoded and in
    /// key order.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        query_params: &BTreeMap<String, String>,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> ClientResult<HttpRequest> {
        let mut url = url.to_string();
        if !query_params.is_empty() {
            let query = query_params
                .iter()
                .map(|(key, value)| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                })
                .collect::<Vec<_>>()
                .join("&");
            let separator = if url.contains('?') { '&' } else { '?' };
            url.push(separator);
            url.push_str(&query);
        }

        let mut request = HttpRequest::parse(method, &url)?;
        request.headers = headers;
        if let Some(body) = body {
            request.body = body;
        }
        Ok(request)
    }

    /// Runs `request` through the pipeline and applies the status-code gate.
    ///
    /// The allowed status codes come from the context
    /// ([`Context::with_allowed_status_codes`]), defaulting to `{200}`. The
    /// client's default timeout is applied to the call's cancellation token.
    pub async fn run(&self, request: HttpRequest, context: Context) -> ClientResult<ClientResponse> {
        let token = context.cancellation_token().cloned();
        let context = context.with_cancellation(token, self.inner.options.default_timeout);

        let response = self.inner.pipeline.run(request, context).await?;
        let status = response.response.status;

        if !response.context.is_status_allowed(status.as_u16()) {
            let error = ClientError::service_from_body(status.as_u16(), response.body());
            tracing::warn!(
                status = status.as_u16(),
                url = %response.request.uri,
                "service returned a disallowed status"
            );
            return Err(error);
        }

        let body = match response.context.deserialized_data() {
            Some(data) => data.clone(),
            None => response.response.body.clone(),
        };

        Ok(ClientResponse {
            status,
            headers: response.response.headers,
            body,
            request: response.request,
            context: response.context,
        })
    }

    /// Runs `request` and decodes the success body as JSON.
    pub async fn run_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        context: Context,
    ) -> ClientResult<T> {
        self.run(request, context).await?.json()
    }

    /// Runs `request` in the background and hands the result to
    /// `completion` on the client's completion queue.
    ///
    /// `completion` is invoked exactly once.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn run_then<F>(&self, request: HttpRequest, context: Context, completion: F)
    where
        F: FnOnce(ClientResult<ClientResponse>) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let result = client.run(request, context).await;
            client
                .completion_queue()
                .dispatch(move || completion(result));
        });
    }
}

impl std::fmt::Debug for PipelineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineClient")
            .field("base_url", &self.inner.base_url)
            .field("pipeline", &self.inner.pipeline)
            .field("options", &self.inner.options)
            .finish()
    }
}

fn is_absolute_http(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

fn validate_absolute(url: &str) -> ClientResult<()> {
    let uri: Uri = url
        .parse()
        .map_err(|e| ClientError::client_with_source(format!("invalid URL: {url}"), e))?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(ClientError::client(format!("URL is not absolute: {url}")));
    }
    Ok(())
}

/// Builder assembling a [`PipelineClient`] with the standard stage stack.
///
/// Stages are added in this order:
///
/// 1. [`ClientRequestIdStage`]
/// 2. [`HeadersStage`] (user agent, API version, custom defaults)
/// 3. [`RetryStage`], only when the options carry a retry policy
/// 4. [`DecompressionStage`]
/// 5. caller stages, in the order given
/// 6. [`LoggingStage`]
/// 7. [`HmacAuthenticationStage`], when an access key is set
pub struct ClientBuilder {
    base_url: String,
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    access_key: Option<String>,
    default_headers: Vec<(String, String)>,
    stages: Vec<BoxedStage>,
}

impl ClientBuilder {
    /// Creates a builder with default options.
    #[must_use]
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            options: ClientOptions::default(),
            access_key: None,
            default_headers: Vec::new(),
            stages: Vec::new(),
        }
    }

    /// Sets the client options.
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Signs every request with an HMAC access key (base64).
    #[must_use]
    pub fn access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// Adds a default header.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Adds a caller stage between decompression and logging.
    #[must_use]
    pub fn stage(mut self, stage: BoxedStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Builds the client.
    pub fn build(self) -> ClientResult<PipelineClient> {
        let mut headers = HeadersStage::builder().user_agent(self.options.user_agent.clone());
        if !self.options.api_version.is_empty() {
            headers = headers.api_version(self.options.api_version.clone());
        }
        for (name, value) in self.default_headers {
            headers = headers.header(name, value);
        }

        let mut stages: Vec<BoxedStage> = vec![
            Arc::new(ClientRequestIdStage::new()),
            Arc::new(headers.build()?),
        ];
        if let Some(policy) = self.options.retry {
            stages.push(Arc::new(RetryStage::new(policy)));
        }
        stages.push(Arc::new(DecompressionStage::new()));
        stages.extend(self.stages);
        stages.push(Arc::new(
            LoggingStage::new().allow_headers(&self.options.allowed_headers),
        ));
        if let Some(key) = self.access_key {
            stages.push(Arc::new(HmacAuthenticationStage::new(key)));
        }

        PipelineClient::new(self.base_url, self.transport, stages, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::CancellationToken;
    use cirrus_pipeline::stages::RetryPolicy;
    use cirrus_test::{json_response, status_response, text_response, MockTransport};
    use serde_json::json;
    use std::time::Duration;

    fn client(transport: &Arc<MockTransport>) -> PipelineClient {
        PipelineClient::new(
            "https://example.com/api",
            transport.clone(),
            Vec::new(),
            ClientOptions::new("2024-01-01"),
        )
        .unwrap()
    }

    fn no_subs() -> [(&'static str, &'static str); 0] {
        []
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = client(&Arc::new(MockTransport::new()));
        assert_eq!(client.base_url(), "https://example.com/api/");
    }

    #[test]
    fn test_relative_base_url_rejected() {
        let err = PipelineClient::new(
            "example.com",
            Arc::new(MockTransport::new()),
            Vec::new(),
            ClientOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Client { .. }));
    }

    #[test]
    fn test_format_templates() {
        let client = client(&Arc::new(MockTransport::new()));

        assert_eq!(
            client.format("/items/{id}", [("id", "42")]).unwrap(),
            "https://example.com/api/items/42"
        );
        assert_eq!(
            client.format("items", no_subs()).unwrap(),
            "https://example.com/api/items"
        );
        assert_eq!(
            client
                .format("https://example.com/api/items?page=2", no_subs())
                .unwrap(),
            "https://example.com/api/items?page=2"
        );
        assert_eq!(
            client
                .format("https://cdn.example.net/next?token=abc", no_subs())
                .unwrap(),
            "https://cdn.example.net/next?token=abc"
        );
    }

    #[test]
    fn test_format_invalid_url_is_signalled() {
        let client = client(&Arc::new(MockTransport::new()));
        let err = client.format("items/{id}", [("id", "a b")]).unwrap_err();
        assert!(matches!(err, ClientError::Client { .. }));
    }

    #[test]
    fn test_request_encodes_sorted_query() {
        let client = client(&Arc::new(MockTransport::new()));
        let mut query = BTreeMap::new();
        query.insert("zeta".to_string(), "last".to_string());
        query.insert("alpha".to_string(), "a b&c".to_string());

        let request = client
            .request(
                Method::GET,
                "https://example.com/api/items?fixed=1",
                &query,
                HeaderMap::new(),
                None,
            )
            .unwrap();
        assert_eq!(
            request.path_and_query(),
            "/api/items?fixed=1&alpha=a%20b%26c&zeta=last"
        );
    }

    #[tokio::test]
    async fn test_status_gate_default_rejects_404() {
        let transport = Arc::new(
            MockTransport::new().with_response(json_response(404, &json!({"error": "missing"}))),
        );
        let request = HttpRequest::parse(Method::GET, "https://example.com/api/x").unwrap();

        let err = client(&transport).run(request, Context::new()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(
            err.to_string(),
            r#"Service returned invalid status code [404]. {"error":"missing"}"#
        );
    }

    #[tokio::test]
    async fn test_status_gate_respects_allowed_codes() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(json_response(404, &json!({"error": "missing"})))
                .with_response(json_response(404, &json!({"error": "missing"}))),
        );
        let client = client(&transport);
        let request = HttpRequest::parse(Method::GET, "https://example.com/api/x").unwrap();

        let only_ok = Context::new().with_allowed_status_codes([200]);
        assert!(client.run(request.clone(), only_ok).await.is_err());

        let with_404 = Context::new().with_allowed_status_codes([200, 404]);
        let response = client.run(request, with_404).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let transport = Arc::new(MockTransport::new().with_response(text_response(500, "oops")));
        let request = HttpRequest::parse(Method::GET, "https://example.com/api/x").unwrap();

        let err = client(&transport).run(request, Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Service returned invalid status code [500].");
    }

    #[tokio::test]
    async fn test_run_json_decoding_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Thread {
            id: String,
        }

        let transport = Arc::new(
            MockTransport::new()
                .with_response(json_response(200, &json!({"id": "t1"})))
                .with_response(json_response(200, &json!({"name": "no id"}))),
        );
        let client = client(&transport);
        let request = HttpRequest::parse(Method::GET, "https://example.com/api/x").unwrap();

        let thread: Thread = client.run_json(request.clone(), Context::new()).await.unwrap();
        assert_eq!(thread.id, "t1");

        let err = client
            .run_json::<Thread>(request, Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Decoding { .. }));
    }

    #[tokio::test]
    async fn test_default_timeout_applies() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(status_response(200))
                .with_delay(Duration::from_secs(5)),
        );
        let client = PipelineClient::new(
            "https://example.com",
            transport,
            Vec::new(),
            ClientOptions::new("v1").with_default_timeout(Duration::from_millis(20)),
        )
        .unwrap();

        let request = HttpRequest::parse(Method::GET, "https://example.com/slow").unwrap();
        let err = client.run(request, Context::new()).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_explicit_cancel() {
        let transport = Arc::new(MockTransport::new().with_response(status_response(200)));
        let token = CancellationToken::new();
        token.cancel();

        let request = HttpRequest::parse(Method::GET, "https://example.com/api/x").unwrap();
        let err = client(&transport)
            .run(request, Context::new().with_cancellation_token(token))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_then_completes_once() {
        let transport = Arc::new(MockTransport::new().with_response(status_response(200)));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let request = HttpRequest::parse(Method::GET, "https://example.com/api/x").unwrap();

        client(&transport).run_then(request, Context::new(), move |result| {
            let _ = tx.send(result.map(|r| r.status));
        });

        assert_eq!(rx.await.unwrap().unwrap(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_run_then_survives_panicking_handler() {
        let transport = Arc::new(MockTransport::new().with_fallback(status_response(200)));
        let client = client(&transport);
        let (tx, rx) = tokio::sync::oneshot::channel();

        let (first_tx, first_rx) = tokio::sync::oneshot::channel::<()>();
        let request = HttpRequest::parse(Method::GET, "https://example.com/api/a").unwrap();
        client.run_then(request, Context::new(), move |_| {
            drop(first_tx);
            panic!("handler failed");
        });
        let _ = first_rx.await;

        let request = HttpRequest::parse(Method::GET, "https://example.com/api/b").unwrap();
        client.run_then(request, Context::new(), move |result| {
            let _ = tx.send(result.map(|r| r.status));
        });

        assert_eq!(rx.await.unwrap().unwrap(), StatusCode::OK);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_builder_stage_order() {
        let client = PipelineClient::builder("https://example.com", Arc::new(MockTransport::new()))
            .options(ClientOptions::new("v1").with_retry(Some(RetryPolicy::default())))
            .access_key("c2VjcmV0")
            .build()
            .unwrap();

        assert_eq!(
            client.pipeline().stage_names(),
            vec![
                "client_request_id",
                "headers",
                "retry",
                "decompression",
                "logging",
                "hmac_authentication"
            ]
        );
    }

    #[tokio::test]
    async fn test_builder_without_retry() {
        let client = PipelineClient::builder("https://example.com", Arc::new(MockTransport::new()))
            .options(ClientOptions::new("v1").with_retry(None))
            .build()
            .unwrap();

        assert!(!client.pipeline().stage_names().contains(&"retry"));
    }

    #[tokio::test]
    async fn test_default_builder_sends_once() {
        let transport = Arc::new(MockTransport::new().with_fallback(status_response(503)));
        let client = PipelineClient::builder("https://example.com", transport.clone())
            .options(ClientOptions::new("v1"))
            .build()
            .unwrap();
        assert!(!client.pipeline().stage_names().contains(&"retry"));

        let request = HttpRequest::parse(Method::POST, "https://example.com/api/items").unwrap();
        let err = client.run(request, Context::new()).await.unwrap_err();

        assert_eq!(err.status_code(), Some(503));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_error_body_is_service_error() {
        let response = status_response(500)
            .with_static_header("content-encoding", "gzip")
            .with_body("not gzip at all");
        let transport = Arc::new(MockTransport::new().with_response(response));
        let client = PipelineClient::builder("https://example.com", transport)
            .options(ClientOptions::new("v1"))
            .build()
            .unwrap();

        let request = HttpRequest::parse(Method::GET, "https://example.com/api/items").unwrap();
        let err = client.run(request, Context::new()).await.unwrap_err();

        assert!(matches!(err, ClientError::Service { .. }));
        assert_eq!(err.status_code(), Some(500));
    }
}
