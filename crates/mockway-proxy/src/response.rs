//! Wire-level response construction.
//!
//! Converts a [`CapturedResponse`] back into the HTTP response sent to the
//! original caller, fixing up framing headers. Four headers are forced:
//! `Content-Length` (recomputed from the UTF-8 byte length), `Content-Type`
//! (from the descriptor), `Date` (stamped now), and `Connection: close` (the
//! proxy does not reuse intercepted connections). Descriptor headers are
//! applied after the forced set, so a same-named descriptor header overrides
//! a forced one.

use crate::dispatch::CapturedResponse;
use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE};
use hyper::{Response, StatusCode};
use std::collections::HashMap;
use std::str::FromStr;

const ERROR_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// RFC 7231 IMF-fixdate, the format the `Date` header requires.
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Build the wire response for a captured descriptor.
pub fn build_response(captured: &CapturedResponse) -> Response<Full<Bytes>> {
    let body = Bytes::copy_from_slice(captured.body.as_bytes());
    let status =
        StatusCode::from_u16(captured.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = Response::new(Full::new(body.clone()));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
    if let Ok(value) = HeaderValue::from_str(&captured.content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date()) {
        headers.insert(DATE, value);
    }
    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    for (name, value) in &captured.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }

    response
}

/// Fixed response for inbound requests that are structurally invalid before
/// any matching is attempted.
pub fn build_bad_request() -> Response<Full<Bytes>> {
    build_response(&CapturedResponse {
        status: StatusCode::BAD_REQUEST.as_u16(),
        content_type: ERROR_CONTENT_TYPE.to_string(),
        headers: HashMap::new(),
        body: String::new(),
    })
}

/// Fail-soft fallback when a dispatch target is broken or unreachable.
pub fn build_not_found() -> Response<Full<Bytes>> {
    build_response(&CapturedResponse {
        status: StatusCode::NOT_FOUND.as_u16(),
        content_type: ERROR_CONTENT_TYPE.to_string(),
        headers: HashMap::new(),
        body: String::new(),
    })
}
