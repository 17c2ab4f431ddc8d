//! Outbound HTTP dispatch.
//!
//! Executes a normalized [`OutboundCall`] against its target (mock engine
//! loopback or original upstream) over a shared pooled client and captures
//! the result as a [`CapturedResponse`]. Everything network-related in the
//! interception pipeline happens here, under an enforced timeout.

use crate::config::{ConnectionPoolConfig, DispatchConfig};
use crate::outbound::OutboundCall;
use crate::registry::{RestMethod, UnsupportedMethod};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;
use tracing::debug;

/// Content type reported when the target response carries none.
const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// Shared pooled HTTP client used for all outbound calls.
pub type HttpClient = Client<
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    BoxBody<Bytes, hyper::Error>,
>;

/// Outbound call rejected before any network I/O.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("url is required")]
    MissingUrl,
    #[error(transparent)]
    Method(#[from] UnsupportedMethod),
}

/// Failure of a dispatched call. The front end degrades every variant to the
/// fail-soft fallback response; none of them propagate to the original
/// client as a transport fault.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid outbound url: {0}")]
    BadUrl(String),
    #[error("failed to build outbound request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("outbound call failed: {0}")]
    Io(#[source] hyper_util::client::legacy::Error),
    #[error("outbound call timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to read response body: {0}")]
    Body(#[source] hyper::Error),
}

/// Normalized response captured from a dispatched call.
///
/// Produced exactly once per call and never mutated afterwards. Duplicate
/// response headers collapse last-write-wins; the body is decoded as UTF-8
/// text.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Strip `Content-Length` from an outbound header set.
///
/// The transport recomputes framing; forwarding a stale value corrupts the
/// outbound request.
pub fn sanitize_headers(headers: &mut HeaderMap) {
    headers.remove(CONTENT_LENGTH);
}

fn validate(call: &OutboundCall) -> Result<(), ValidationError> {
    if call.url.trim().is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    Ok(())
}

fn full_body(bytes: Bytes) -> BoxBody<Bytes, hyper::Error> {
    Full::new(bytes)
        .map_err(|never: Infallible| match never {})
        .boxed()
}

/// Create the shared HTTP client with connection pooling.
pub fn create_http_client(pool: &ConnectionPoolConfig) -> HttpClient {
    let mut http_connector = hyper_util::client::legacy::connect::HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_timeout_secs)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(pool.connect_timeout_secs)));
    http_connector.enforce_http(false); // Allow both HTTP and HTTPS

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .expect("Failed to load native root certificates")
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(https_connector)
}

/// Executes outbound calls and captures normalized responses.
pub struct Dispatcher {
    client: HttpClient,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(dispatch: &DispatchConfig, pool: &ConnectionPoolConfig) -> Self {
        Self::with_client(
            create_http_client(pool),
            Duration::from_secs(dispatch.timeout_secs),
        )
    }

    /// Build a dispatcher around an existing client, sharing its pool.
    pub fn with_client(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Execute the call and capture the response.
    ///
    /// Validation failures never reach the network. If the inbound
    /// connection goes away the caller can drop the future; the client
    /// cleans the outbound connection up on its own.
    pub async fn execute(&self, call: OutboundCall) -> Result<CapturedResponse, DispatchError> {
        validate(&call)?;

        let mut call = call;
        sanitize_headers(&mut call.headers);

        let uri: Uri = call
            .url
            .parse()
            .map_err(|_| DispatchError::BadUrl(call.url.clone()))?;

        let method = match call.method {
            RestMethod::Get => Method::GET,
            RestMethod::Post => Method::POST,
            RestMethod::Put => Method::PUT,
            RestMethod::Delete => Method::DELETE,
            RestMethod::Patch => Method::PATCH,
        };

        // PATCH takes its raw bytes directly; an absent body stays absent
        // rather than becoming an empty-string payload.
        let body = match call.method {
            RestMethod::Post | RestMethod::Put => {
                full_body(call.body.clone().unwrap_or_default())
            }
            RestMethod::Patch => match call.body.clone() {
                Some(bytes) => full_body(bytes),
                None => full_body(Bytes::new()),
            },
            RestMethod::Get | RestMethod::Delete => full_body(Bytes::new()),
        };

        let mut request = Request::builder().method(method).uri(uri);
        for (name, value) in call.headers.iter() {
            request = request.header(name, value);
        }
        let request = request.body(body)?;

        debug!("Dispatching {} {}", call.method, call.url);

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| DispatchError::Timeout(self.timeout))?
            .map_err(DispatchError::Io)?;

        let status = response.status().as_u16();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(DispatchError::Body)?
            .to_bytes();
        let body = String::from_utf8_lossy(&body_bytes).into_owned();

        Ok(CapturedResponse {
            status,
            content_type,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{build_call, InboundContext};
    use hyper::header::HeaderValue;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&DispatchConfig::default(), &ConnectionPoolConfig::default())
    }

    #[test]
    fn sanitize_strips_content_length_only() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        sanitize_headers(&mut headers);

        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(headers.get("accept").unwrap(), "*/*");
    }

    #[tokio::test]
    async fn empty_url_fails_validation_before_network() {
        let call = build_call(&InboundContext::default(), RestMethod::Get, String::new());

        let err = dispatcher().execute(call).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Validation(ValidationError::MissingUrl)
        ));
    }

    #[tokio::test]
    async fn unparseable_url_is_rejected() {
        let call = build_call(
            &InboundContext::default(),
            RestMethod::Get,
            "http://".to_string(),
        );

        let err = dispatcher().execute(call).await.unwrap_err();
        assert!(matches!(err, DispatchError::BadUrl(_)));
    }

    #[tokio::test]
    async fn unreachable_target_is_an_io_error() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let mut dispatcher = dispatcher();
        dispatcher.timeout = Duration::from_millis(500);

        let call = build_call(
            &InboundContext::default(),
            RestMethod::Get,
            "http://192.0.2.1:9/".to_string(),
        );

        let err = dispatcher.execute(call).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Io(_) | DispatchError::Timeout(_)
        ));
    }
}
