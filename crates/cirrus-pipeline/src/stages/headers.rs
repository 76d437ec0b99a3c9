//! Default header stage.
//!
//! Adds configured headers (user agent, API version, arbitrary defaults) to
//! each request. Headers the caller already set are never overwritten.

use crate::stage::{Next, PipelineRequest, PipelineResponse, Stage};
use cirrus_core::header::{HeaderName, HeaderValue, USER_AGENT};
use cirrus_core::{BoxFuture, ClientError, ClientResult};

/// Header carrying the service API version.
pub const API_VERSION_HEADER: &str = "x-ms-version";

/// Stage that injects default headers.
///
/// Header names and values are validated when the stage is built, so a bad
/// default fails at construction rather than on every call.
///
/// # Example
///
/// ```
/// use cirrus_pipeline::stages::HeadersStage;
///
/// let stage = HeadersStage::builder()
///     .user_agent("cirrus/0.1")
///     .api_version("2024-01-01")
///     .header("x-tenant", "contoso")
///     .build()
///     .unwrap();
/// assert_eq!(stage.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeadersStage {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl HeadersStage {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> HeadersStageBuilder {
        HeadersStageBuilder::default()
    }

    /// Number of default headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if no default headers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl Stage for HeadersStage {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn process<'a>(
        &'a self,
        mut request: PipelineRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, ClientResult<PipelineResponse>> {
        Box::pin(async move {
            for (name, value) in &self.headers {
                if !request.request.headers.contains_key(name) {
                    request.request.headers.insert(name.clone(), value.clone());
                }
            }
            next.run(request).await
        })
    }
}

/// Builder for [`HeadersStage`].
#[derive(Debug, Default)]
pub struct HeadersStageBuilder {
    headers: Vec<(String, String)>,
}

impl HeadersStageBuilder {
    /// Sets the `user-agent` header.
    #[must_use]
    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.header(USER_AGENT.as_str(), user_agent)
    }

    /// Sets the API version header.
    #[must_use]
    pub fn api_version(self, version: impl Into<String>) -> Self {
        self.header(API_VERSION_HEADER, version)
    }

    /// Adds an arbitrary default header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Validates the headers and builds the stage.
    pub fn build(self) -> ClientResult<HeadersStage> {
        let headers = self
            .headers
            .into_iter()
            .map(|(name, value)| {
                let parsed_name = HeaderName::try_from(name.as_str()).map_err(|e| {
                    ClientError::client_with_source(format!("invalid header name: {name}"), e)
                })?;
                let parsed_value = HeaderValue::try_from(value).map_err(|e| {
                    ClientError::client_with_source(format!("invalid value for header {name}"), e)
                })?;
                Ok((parsed_name, parsed_value))
            })
            .collect::<ClientResult<Vec<_>>>()?;
        Ok(HeadersStage { headers })
    }
}
