//! End-to-end interception tests.
//!
//! Each test stands up a real REST mock engine and intercepting proxy on
//! loopback, then drives traffic through the proxy with a reqwest client
//! configured to use it.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use mockway_proxy::config::{Config, ConnectionPoolConfig, DispatchConfig, EngineSettings, ListenConfig};
use mockway_proxy::engine::{RestEngineConfig, RestMockEngine, ServerEngine};
use mockway_proxy::proxy::ProxyServer;
use mockway_proxy::registry::{ActiveMock, MockRegistry, MockResponseSpec, RestMethod};

fn mock(method: RestMethod, path: &str, body: &str) -> ActiveMock {
    ActiveMock {
        method,
        path: path.to_string(),
        response: MockResponseSpec {
            status: 200,
            content_type: "application/json".to_string(),
            headers: Default::default(),
            body: body.to_string(),
        },
    }
}

/// Echo upstream: replies `upstream:<method>:<path>:<body>`.
async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(|req: Request<Incoming>| async move {
                    let method = req.method().clone();
                    let path = req.uri().path().to_string();
                    let body = req.collect().await.unwrap().to_bytes();
                    let reply = format!(
                        "upstream:{}:{}:{}",
                        method,
                        path,
                        String::from_utf8_lossy(&body)
                    );
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(reply))))
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

/// Start engine + proxy; returns the proxy port, the registry handle, and
/// the engine for lifecycle control.
async fn start_stack(mocks: Vec<ActiveMock>) -> (u16, MockRegistry, Arc<RestMockEngine>) {
    let registry = MockRegistry::new(mocks);
    let engine = Arc::new(RestMockEngine::new(registry.clone()));
    engine.start(RestEngineConfig::default()).await.unwrap();

    let config = Config {
        listen: ListenConfig { port: 0 },
        engine: EngineSettings::default(),
        dispatch: DispatchConfig::default(),
        connection_pool: ConnectionPoolConfig::default(),
        mocks: vec![],
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = ProxyServer::new(Arc::new(config), registry.clone(), engine.clone());
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    (port, registry, engine)
}

fn proxied_client(proxy_port: u16) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://127.0.0.1:{proxy_port}")).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn matched_request_gets_the_canned_response() {
    let (proxy_port, _registry, _engine) =
        start_stack(vec![mock(RestMethod::Get, "/users/:id", r#"{"id": 42}"#)]).await;
    let client = proxied_client(proxy_port);

    // The "destination" never exists; the mock answers before any upstream
    // contact is attempted.
    let res = client
        .get("http://mock-target.invalid/users/42")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(res.text().await.unwrap(), r#"{"id": 42}"#);
}

#[tokio::test]
async fn unmatched_request_passes_through_to_upstream() {
    let upstream = start_upstream().await;
    let (proxy_port, _registry, _engine) =
        start_stack(vec![mock(RestMethod::Get, "/users/:id", "{}")]).await;
    let client = proxied_client(proxy_port);

    let res = client
        .get(format!("http://{upstream}/unmocked"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "upstream:GET:/unmocked:");
}

#[tokio::test]
async fn post_body_reaches_the_upstream() {
    let upstream = start_upstream().await;
    let (proxy_port, _registry, _engine) = start_stack(vec![]).await;
    let client = proxied_client(proxy_port);

    let res = client
        .post(format!("http://{upstream}/submit"))
        .body("hello payload")
        .send()
        .await
        .unwrap();

    assert_eq!(res.text().await.unwrap(), "upstream:POST:/submit:hello payload");
}

#[tokio::test]
async fn method_must_match_for_interception() {
    let upstream = start_upstream().await;
    let (proxy_port, _registry, _engine) =
        start_stack(vec![mock(RestMethod::Get, "/users/:id", "{}")]).await;
    let client = proxied_client(proxy_port);

    // Same path, different method: passthrough, not the mock.
    let res = client
        .post(format!("http://{upstream}/users/42"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.text().await.unwrap(), "upstream:POST:/users/42:");
}

#[tokio::test]
async fn unreachable_upstream_degrades_to_not_found() {
    let (proxy_port, _registry, _engine) = start_stack(vec![]).await;
    let client = proxied_client(proxy_port);

    // Nothing listens on port 9 of loopback; connection is refused.
    let res = client
        .get("http://127.0.0.1:9/none")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "");
}

#[tokio::test]
async fn stopped_engine_degrades_to_not_found() {
    let (proxy_port, _registry, engine) =
        start_stack(vec![mock(RestMethod::Get, "/users/:id", "{}")]).await;
    engine.shutdown().await.unwrap();
    let client = proxied_client(proxy_port);

    let res = client
        .get("http://mock-target.invalid/users/42")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "");
}

#[tokio::test]
async fn options_bypasses_interception_even_with_matching_path() {
    let upstream = start_upstream().await;
    let (proxy_port, _registry, _engine) =
        start_stack(vec![mock(RestMethod::Get, "/users/:id", "{}")]).await;
    let client = proxied_client(proxy_port);

    let res = client
        .request(reqwest::Method::OPTIONS, format!("http://{upstream}/users/42"))
        .send()
        .await
        .unwrap();

    // The raw passthrough reached the upstream, not the mock engine.
    assert_eq!(res.text().await.unwrap(), "upstream:OPTIONS:/users/42:");
}

#[tokio::test]
async fn registry_update_is_visible_to_new_requests() {
    let (proxy_port, registry, _engine) =
        start_stack(vec![mock(RestMethod::Get, "/users/:id", r#"{"v": 1}"#)]).await;
    let client = proxied_client(proxy_port);

    let res = client
        .get("http://mock-target.invalid/users/7")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), r#"{"v": 1}"#);

    registry.replace(vec![mock(RestMethod::Get, "/users/:id", r#"{"v": 2}"#)]);

    let res = client
        .get("http://mock-target.invalid/users/7")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), r#"{"v": 2}"#);
}

#[tokio::test]
async fn direct_engine_call_serves_the_mock() {
    let registry = MockRegistry::new(vec![mock(RestMethod::Get, "/ping", "pong")]);
    let engine = RestMockEngine::new(registry);
    let state = engine.start(RestEngineConfig::default()).await.unwrap();

    let res = reqwest::get(format!("http://127.0.0.1:{}/ping", state.port))
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "pong");
    engine.shutdown().await.unwrap();
}
