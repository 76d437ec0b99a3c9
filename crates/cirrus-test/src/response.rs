//! Canned response helpers.

use bytes::Bytes;
use cirrus_core::HttpResponse;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;

/// Builds a response with a JSON body and `content-type: application/json`.
///
/// # Panics
///
/// Panics if `status` is not a valid HTTP status or `value` cannot be
/// serialized.
#[must_use]
pub fn json_response<T: Serialize>(status: u16, value: &T) -> HttpResponse {
    let body = serde_json::to_vec(value).expect("test body serializes");
    let mut response = status_response(status).with_body(Bytes::from(body));
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Builds a response with a plain-text body.
#[must_use]
pub fn text_response(status: u16, body: impl Into<String>) -> HttpResponse {
    let mut response = status_response(status).with_body(Bytes::from(body.into()));
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// Builds a response with an empty body.
///
/// # Panics
///
/// Panics if `status` is not a valid HTTP status.
#[must_use]
pub fn status_response(status: u16) -> HttpResponse {
    HttpResponse::new(StatusCode::from_u16(status).expect("valid status code"))
}
