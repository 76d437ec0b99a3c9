//! Client options.

use cirrus_pipeline::stages::RetryPolicy;
use std::time::Duration;

/// Options shared by every call made through a
/// [`PipelineClient`](crate::PipelineClient).
///
/// # Example
///
/// ```
/// use cirrus_client::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::new("2024-01-01")
///     .with_default_timeout(Duration::from_secs(30))
///     .with_user_agent("my-app/1.0");
/// assert_eq!(options.api_version, "2024-01-01");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Service API version, sent as `x-ms-version`.
    pub api_version: String,
    /// `user-agent` header value.
    pub user_agent: String,
    /// Timeout applied to calls whose cancellation token has none.
    pub default_timeout: Option<Duration>,
    /// Extra header names logged without redaction.
    pub allowed_headers: Vec<String>,
    /// Retry policy. `None`, the default, leaves the retry stage out so
    /// each call is sent at most once.
    pub retry: Option<RetryPolicy>,
}

impl ClientOptions {
    /// Creates options for `api_version` with defaults elsewhere.
    #[must_use]
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            ..Self::default()
        }
    }

    /// Sets the default per-call timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// Adds header names to the logging allow list.
    #[must_use]
    pub fn with_allowed_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers.extend(names.into_iter().map(Into::into));
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: String::new(),
            user_agent: concat!("cirrus/", env!("CARGO_PKG_VERSION")).to_string(),
            default_timeout: None,
            allowed_headers: Vec::new(),
            retry: None,
        }
    }
}
