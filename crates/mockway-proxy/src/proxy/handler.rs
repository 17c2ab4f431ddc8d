//! Per-request orchestration.
//!
//! One inbound request walks: exclusion check, path extraction (with the
//! dummy-scheme fixup for relative URIs), mock resolution, dispatch-target
//! choice, outbound build, dispatch, response build. Any failure after path
//! extraction degrades to the fail-soft 404; a URI that cannot be parsed at
//! all degrades to the fixed 400.

use crate::dispatch::{Dispatcher, HttpClient};
use crate::engine::{MockServerState, StateSource};
use crate::outbound::{
    build_call, build_mock_url, build_upstream_url, fix_scheme_with_dummy_prefix, InboundContext,
};
use crate::registry::{ActiveMock, MockRegistry, RestMethod};
use crate::resolver;
use crate::response;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{Method, Request, Response, Uri};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// State the handler needs for one request.
pub struct ProxyContext<'a> {
    pub dispatcher: &'a Dispatcher,
    pub client: &'a HttpClient,
    pub registry: &'a MockRegistry,
    pub mock_state: &'a dyn StateSource,
    pub user_context: Option<&'a str>,
    pub upstream_scheme: &'a str,
}

/// Methods the proxy never mock-resolves.
pub fn is_excluded_method(method: &Method) -> bool {
    matches!(*method, Method::CONNECT | Method::OPTIONS | Method::TRACE)
}

/// Where a non-excluded request gets dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DispatchTarget {
    /// Matched mock, targeted at the engine loopback address.
    Mock(String),
    /// No match; the original destination.
    Upstream(String),
}

/// Choose the dispatch destination. `None` means no usable target exists
/// (mock matched but engine down, or passthrough with no determinable host),
/// which the caller degrades to the fail-soft fallback.
pub(crate) fn choose_target(
    matched: Option<&ActiveMock>,
    parsed: &Uri,
    original: &Uri,
    host: Option<&str>,
    mock_state: MockServerState,
    user_context: Option<&str>,
    upstream_scheme: &str,
) -> Option<DispatchTarget> {
    match matched {
        Some(_) => {
            if !mock_state.running {
                warn!("Mock matched but engine is not running");
                return None;
            }
            Some(DispatchTarget::Mock(build_mock_url(
                parsed,
                mock_state.port,
                user_context,
            )))
        }
        None => build_upstream_url(original, host, upstream_scheme).map(DispatchTarget::Upstream),
    }
}

fn boxed(response: Response<Full<Bytes>>) -> Response<BoxBody<Bytes, hyper::Error>> {
    response.map(|body| BoxBody::new(body.map_err(|never: Infallible| match never {})))
}

/// Handle one inbound request end to end.
pub async fn handle_request(
    ctx: &ProxyContext<'_>,
    req: Request<Incoming>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
    let method = req.method().clone();
    let uri = req.uri().clone();

    debug!("Inbound: {} {}", method, uri);

    // Excluded methods bypass mock resolution entirely.
    if method == Method::CONNECT {
        return Ok(tunnel(req));
    }
    if is_excluded_method(&method) {
        return Ok(forward_raw(ctx, req).await);
    }

    // Give relative URIs a dummy prefix purely so they parse as absolute for
    // path extraction.
    let parsed: Uri = match fix_scheme_with_dummy_prefix(&uri.to_string()).parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Malformed inbound URI: {}", uri);
            return Ok(boxed(response::build_bad_request()));
        }
    };

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let snapshot = ctx.registry.snapshot();
    let matched = resolver::resolve(method.as_str(), parsed.path(), &snapshot);
    if let Some(mock) = matched {
        debug!("Matched mock: {} {}", mock.method, mock.path);
    }

    let target = match choose_target(
        matched,
        &parsed,
        &uri,
        host.as_deref(),
        ctx.mock_state.state(),
        ctx.user_context,
        ctx.upstream_scheme,
    ) {
        Some(target) => target,
        None => return Ok(boxed(response::build_not_found())),
    };

    let rest_method: RestMethod = match method.as_str().parse() {
        Ok(rest_method) => rest_method,
        Err(err) => {
            debug!("{}", err);
            return Ok(boxed(response::build_not_found()));
        }
    };

    let headers = req.headers().clone();
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read inbound body: {}", e);
            return Ok(boxed(response::build_not_found()));
        }
    };

    let dest_url = match target {
        DispatchTarget::Mock(url) | DispatchTarget::Upstream(url) => url,
    };
    let call = build_call(&InboundContext { headers, body }, rest_method, dest_url);

    match ctx.dispatcher.execute(call).await {
        Ok(captured) => Ok(boxed(response::build_response(&captured))),
        Err(e) => {
            // A broken mock target or unreachable upstream must not crash
            // the pipeline; the client sees a plain 404.
            warn!("Dispatch failed: {}", e);
            Ok(boxed(response::build_not_found()))
        }
    }
}

/// Forward an excluded (non-CONNECT) method as-is, streaming both bodies.
async fn forward_raw(
    ctx: &ProxyContext<'_>,
    req: Request<Incoming>,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let target = match build_upstream_url(req.uri(), host.as_deref(), ctx.upstream_scheme) {
        Some(target) => target,
        None => return boxed(response::build_not_found()),
    };

    let (parts, body) = req.into_parts();
    let mut forward = Request::builder().method(parts.method).uri(target);
    for (name, value) in parts.headers.iter() {
        if name != HOST {
            forward = forward.header(name, value);
        }
    }

    let forward = match forward.body(BoxBody::new(body)) {
        Ok(forward) => forward,
        Err(e) => {
            warn!("Failed to build passthrough request: {}", e);
            return boxed(response::build_not_found());
        }
    };

    match ctx.client.request(forward).await {
        Ok(res) => {
            let (parts, body) = res.into_parts();
            Response::from_parts(parts, BoxBody::new(body))
        }
        Err(e) => {
            warn!("Passthrough failed: {}", e);
            boxed(response::build_not_found())
        }
    }
}

/// Open a blind tunnel for CONNECT. The handshake response goes back
/// immediately; the relay runs in its own task once the connection upgrades.
fn tunnel(req: Request<Incoming>) -> Response<BoxBody<Bytes, hyper::Error>> {
    let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
        return boxed(response::build_bad_request());
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => match TcpStream::connect(&authority).await {
                Ok(mut server) => {
                    let mut client = TokioIo::new(upgraded);
                    if let Err(e) = tokio::io::copy_bidirectional(&mut client, &mut server).await {
                        debug!("Tunnel to {} closed: {}", authority, e);
                    }
                }
                Err(e) => warn!("Tunnel connect to {} failed: {}", authority, e),
            },
            Err(e) => warn!("CONNECT upgrade failed: {}", e),
        }
    });

    Response::new(BoxBody::new(
        Full::new(Bytes::new()).map_err(|never: Infallible| match never {}),
    ))
}
