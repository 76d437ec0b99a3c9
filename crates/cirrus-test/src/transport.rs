//! Scripted in-memory transport.

use cirrus_core::{
    BoxFuture, ClientError, ClientResult, HttpRequest, HttpResponse, Transport,
    TransportErrorKind,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Computes a response from the request, used once the script is exhausted.
pub type Responder = Arc<dyn Fn(&HttpRequest) -> ClientResult<HttpResponse> + Send + Sync>;

enum Scripted {
    Response(HttpResponse),
    Error(ClientError),
}

/// A [`Transport`] that replays scripted outcomes and records every request.
///
/// Outcomes are served in FIFO order. Once the script is empty the
/// responder (if any) answers; without one the call fails with a
/// non-transient transport error so a missing script entry is obvious.
///
/// # Example
///
/// ```
/// use cirrus_core::{HttpRequest, Method, Transport};
/// use cirrus_test::{status_response, MockTransport};
///
/// # tokio_test::block_on(async {
/// let transport = MockTransport::new().with_response(status_response(204));
/// let request = HttpRequest::parse(Method::DELETE, "https://example.com/items/1").unwrap();
///
/// let response = transport.send(request).await.unwrap();
/// assert_eq!(response.status.as_u16(), 204);
/// assert_eq!(transport.call_count(), 1);
/// # });
/// ```
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Creates a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that answers every request with `responder`.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> ClientResult<HttpResponse> + Send + Sync + 'static,
    {
        Self::new().with_responder(responder)
    }

    /// Appends a response to the script.
    #[must_use]
    pub fn with_response(self, response: HttpResponse) -> Self {
        self.push_response(response);
        self
    }

    /// Appends a failure to the script.
    #[must_use]
    pub fn with_error(self, error: ClientError) -> Self {
        self.push_error(error);
        self
    }

    /// Sets the responder used after the script runs out.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> ClientResult<HttpResponse> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Sets the fallback response served after the script runs out.
    #[must_use]
    pub fn with_fallback(self, response: HttpResponse) -> Self {
        self.with_responder(move |_| Ok(response.clone()))
    }

    /// Delays every exchange, useful to observe cancellation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Appends a response to the script of a shared transport.
    pub fn push_response(&self, response: HttpResponse) {
        self.script.lock().push_back(Scripted::Response(response));
    }

    /// Appends a failure to the script of a shared transport.
    pub fn push_error(&self, error: ClientError) {
        self.script.lock().push_back(Scripted::Error(error));
    }

    /// Number of scripted outcomes not yet served.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }

    /// Number of `send` calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// The most recent request, if any.
    #[must_use]
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    fn answer(&self, request: &HttpRequest) -> ClientResult<HttpResponse> {
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Error(error)) => Err(error),
            None => match &self.responder {
                Some(responder) => responder(request),
                None => Err(ClientError::transport(
                    TransportErrorKind::Other,
                    format!("no scripted response for {} {}", request.method, request.uri),
                )),
            },
        }
    }
}

impl Transport for MockTransport {
    fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, ClientResult<HttpResponse>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.answer(&request)
        })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("pending", &self.pending())
            .field("calls", &self.call_count())
            .field("has_responder", &self.responder.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{json_response, status_response};
    use cirrus_core::Method;
    use serde_json::json;

    fn get(url: &str) -> HttpRequest {
        HttpRequest::parse(Method::GET, url).unwrap()
    }

    #[tokio::test]
    async fn test_script_is_fifo() {
        let transport = MockTransport::new()
            .with_response(status_response(200))
            .with_response(status_response(201));

        let first = transport.send(get("https://example.com/a")).await.unwrap();
        let second = transport.send(get("https://example.com/b")).await.unwrap();

        assert_eq!(first.status.as_u16(), 200);
        assert_eq!(second.status.as_u16(), 201);
        assert_eq!(transport.pending(), 0);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let transport = MockTransport::new().with_error(ClientError::transport(
            TransportErrorKind::ConnectionLost,
            "reset",
        ));

        let err = transport.send(get("https://example.com")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unscripted_call_fails() {
        let transport = MockTransport::new();
        let err = transport.send(get("https://example.com")).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Other));
    }

    #[tokio::test]
    async fn test_responder_sees_request() {
        let transport = MockTransport::from_fn(|request| {
            Ok(json_response(200, &json!({"path": request.uri.path()})))
        });

        let response = transport.send(get("https://example.com/items")).await.unwrap();
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["path"], "/items");
    }

    #[tokio::test]
    async fn test_records_requests() {
        let transport = MockTransport::new().with_fallback(status_response(200));
        transport.send(get("https://example.com/1")).await.unwrap();
        transport.send(get("https://example.com/2")).await.unwrap();

        assert_eq!(transport.call_count(), 2);
        let paths: Vec<_> = transport
            .requests()
            .iter()
            .map(|r| r.uri.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/1", "/2"]);
        assert_eq!(transport.last_request().unwrap().uri.path(), "/2");
    }
}
