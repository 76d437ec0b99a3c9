//! HTTP request and response values exchanged with the transport.
//!
//! These are plain, cloneable values: a stage that needs to resubmit a
//! request (retry) can clone it, and the signing stage can read the final
//! body bytes without touching a streaming body.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Final body bytes.
    pub body: Bytes,
}

impl HttpRequest {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Parses `url` and creates a request.
    pub fn parse(method: Method, url: &str) -> ClientResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ClientError::client_with_source(format!("invalid URL: {url}"), e))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(ClientError::client(format!("URL is not absolute: {url}")));
        }
        Ok(Self::new(method, uri))
    }

    /// Sets a header, replacing any existing value.
    pub fn with_header(mut self, name: &str, value: &str) -> ClientResult<Self> {
        self.set_header(name, value)?;
        Ok(self)
    }

    /// Sets a header in place, replacing any existing value.
    pub fn set_header(&mut self, name: &str, value: &str) -> ClientResult<()> {
        let name = HeaderName::try_from(name)
            .map_err(|e| ClientError::client_with_source(format!("invalid header name: {name}"), e))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| ClientError::client_with_source(format!("invalid value for header {name}"), e))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `value` as the JSON body and sets the content type.
    pub fn with_json<T: serde::Serialize>(mut self, value: &T) -> ClientResult<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ClientError::client_with_source("request body is not encodable", e))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Bytes::from(body);
        Ok(self)
    }

    /// Returns a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the request path and query; an empty path reads as `/`.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match self.uri.query() {
            Some(query) => format!("{}?{query}", self.uri.path()),
            None => self.uri.path().to_string(),
        }
    }
}

/// A response returned by the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body bytes.
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with no headers and an empty body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header from static strings.
    #[must_use]
    pub fn with_static_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
        self
    }

    /// Returns a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decodes the raw body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::decoding_with_source("response body is not valid JSON", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_url() {
        let request = HttpRequest::parse(Method::GET, "https://example.com/a?b=c").unwrap();
        assert_eq!(request.path_and_query(), "/a?b=c");
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_path_and_query_without_path() {
        let request = HttpRequest::parse(Method::GET, "https://localhost?id=1").unwrap();
        assert_eq!(request.path_and_query(), "/?id=1");
    }

    #[test]
    fn test_parse_relative_url_fails() {
        let err = HttpRequest::parse(Method::GET, "/relative").unwrap_err();
        assert!(matches!(err, ClientError::Client { .. }));
    }

    #[test]
    fn test_invalid_header_is_client_error() {
        let request = HttpRequest::parse(Method::GET, "https://example.com").unwrap();
        let err = request.with_header("bad header", "x").unwrap_err();
        assert!(matches!(err, ClientError::Client { .. }));
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = HttpRequest::parse(Method::POST, "https://example.com")
            .unwrap()
            .with_json(&serde_json::json!({"name": "alice"}))
            .unwrap();
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(&request.body[..], br#"{"name":"alice"}"#);
    }

    #[test]
    fn test_response_json_decoding_error() {
        let response = HttpResponse::new(StatusCode::OK).with_body("not json");
        let err = response.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, ClientError::Decoding { .. }));
    }
}
