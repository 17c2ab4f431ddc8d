//! Normalized outbound call descriptors and the call builder.
//!
//! A resolved mock (or a passthrough decision) plus the original request is
//! translated here into one [`OutboundCall`] that the dispatcher executes
//! against either the mock engine's loopback address or the original
//! upstream.

use crate::registry::RestMethod;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Uri};

/// Marker header stamped on every call built by the interception path.
///
/// The mock engine uses it to keep intercepted traffic out of its live
/// request log, distinguishing it from direct admin-triggered calls. Name
/// and value are a stable contract for dependent tooling.
pub static INTERCEPT_HEADER: HeaderName = HeaderName::from_static("x-mockway-intercept");
pub static INTERCEPT_HEADER_VALUE: HeaderValue = HeaderValue::from_static("true");

const MOCK_SERVER_HOST: &str = "http://localhost:";

/// Normalized outbound call.
///
/// `url` and `method` are always present; `body` is set only for methods
/// that carry one and is never mutated after dispatch.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub url: String,
    pub method: RestMethod,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// The parts of the inbound request the call builder needs.
#[derive(Debug, Clone, Default)]
pub struct InboundContext {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Build the outbound call for a chosen destination.
///
/// GET and DELETE never carry a body even when the inbound request had one.
/// PATCH takes the raw inbound bytes, or no payload at all when they are
/// empty; it must not degrade to an empty-string payload.
pub fn build_call(ctx: &InboundContext, method: RestMethod, dest_url: String) -> OutboundCall {
    let body = match method {
        RestMethod::Post | RestMethod::Put => Some(ctx.body.clone()),
        RestMethod::Patch => (!ctx.body.is_empty()).then(|| ctx.body.clone()),
        RestMethod::Get | RestMethod::Delete => None,
    };

    let mut headers = ctx.headers.clone();
    headers.insert(INTERCEPT_HEADER.clone(), INTERCEPT_HEADER_VALUE.clone());

    OutboundCall {
        url: dest_url,
        method,
        headers,
        body,
    }
}

/// Loopback URL for a resolved mock: the engine's address, the optional
/// user-context prefix, then the original path and query string unchanged.
pub fn build_mock_url(inbound: &Uri, mock_port: u16, user_context: Option<&str>) -> String {
    let mut url = String::new();
    url.push_str(MOCK_SERVER_HOST);
    url.push_str(&mock_port.to_string());

    if let Some(ctx) = user_context.map(|c| c.trim_matches('/')).filter(|c| !c.is_empty()) {
        url.push('/');
        url.push_str(ctx);
    }

    url.push_str(inbound.path());

    if let Some(query) = inbound.query() {
        url.push('?');
        url.push_str(query);
    }

    url
}

/// Absolute URL for passthrough to the original upstream.
///
/// Proxy-form requests already carry an absolute URI and are forwarded as
/// received. Origin-form requests are rebuilt from the Host header and the
/// configured default scheme. `None` means the destination cannot be
/// determined at all.
pub fn build_upstream_url(inbound: &Uri, host: Option<&str>, default_scheme: &str) -> Option<String> {
    if inbound.scheme().is_some() {
        return Some(inbound.to_string());
    }

    let host = host.filter(|h| !h.is_empty())?;
    let path_and_query = inbound
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Some(format!("{default_scheme}://{host}{path_and_query}"))
}

/// Prefix a relative/opaque URI so it parses as an absolute URL.
///
/// Purely a parsing aid for path extraction; nothing about the real scheme
/// is decided here.
pub fn fix_scheme_with_dummy_prefix(uri: &str) -> String {
    if uri.starts_with("http") {
        uri.to_string()
    } else {
        format!("https://dummyhost{uri}")
    }
}
