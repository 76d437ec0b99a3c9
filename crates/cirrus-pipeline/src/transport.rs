//! reqwest-backed [`Transport`].

use cirrus_core::{
    BoxFuture, ClientError, ClientResult, HttpRequest, HttpResponse, Transport,
    TransportErrorKind,
};

/// A [`Transport`] that performs real HTTP exchanges with `reqwest`.
///
/// Redirects and timeouts follow the wrapped client's configuration.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest` client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, ClientResult<HttpResponse>> {
        Box::pin(async move {
            let response = self
                .client
                .request(request.method, request.uri.to_string())
                .headers(request.headers)
                .body(request.body)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(transport_error)?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn transport_error(error: reqwest::Error) -> ClientError {
    let kind = if error.is_timeout() {
        TransportErrorKind::TimedOut
    } else if error.is_connect() {
        TransportErrorKind::NotConnected
    } else if error.is_request() || error.is_body() {
        TransportErrorKind::ConnectionLost
    } else {
        TransportErrorKind::Other
    };
    ClientError::transport_with_source(kind, error.to_string(), error)
}
