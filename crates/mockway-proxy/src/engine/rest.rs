//! REST mock engine.
//!
//! Serves canned responses straight from the registry over a loopback
//! listener. The intercepting proxy targets this engine for matched traffic;
//! direct calls (admin "test this mock") hit the same listener without the
//! intercept marker header and show up in the live request log.

use super::{EngineError, MockServerState, ServerEngine, StateSource};
use crate::outbound::INTERCEPT_HEADER;
use crate::registry::MockRegistry;
use crate::resolver;
use crate::response;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default)]
pub struct RestEngineConfig {
    /// Port to bind on loopback; 0 lets the OS assign one.
    pub port: u16,
    /// Optional path prefix the proxy inserts into mock URLs; stripped back
    /// off before resolving.
    pub user_context: Option<String>,
}

struct EngineRuntime {
    port: u16,
    shutdown_tx: broadcast::Sender<()>,
}

/// REST protocol engine implementing the uniform lifecycle contract.
pub struct RestMockEngine {
    registry: MockRegistry,
    /// Serializes start/shutdown against each other.
    runtime: Mutex<Option<EngineRuntime>>,
    /// Short-lived-lock state reads, callable from any thread.
    state: Arc<RwLock<MockServerState>>,
}

impl RestMockEngine {
    pub fn new(registry: MockRegistry) -> Self {
        Self {
            registry,
            runtime: Mutex::new(None),
            state: Arc::new(RwLock::new(MockServerState::stopped())),
        }
    }
}

#[async_trait]
impl ServerEngine for RestMockEngine {
    type Config = RestEngineConfig;

    async fn start(&self, config: RestEngineConfig) -> Result<MockServerState, EngineError> {
        let mut runtime = self.runtime.lock().await;
        if let Some(active) = runtime.as_ref() {
            return Err(EngineError::AlreadyRunning(active.port));
        }

        let listener = TcpListener::bind(("127.0.0.1", config.port))
            .await
            .map_err(|e| EngineError::Bind(config.port, e))?;
        let port = listener
            .local_addr()
            .map_err(|e| EngineError::Bind(config.port, e))?
            .port();

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let registry = self.registry.clone();
        let user_context = config.user_context.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let registry = registry.clone();
                                let user_context = user_context.clone();
                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);
                                    let service = service_fn(move |req| {
                                        let registry = registry.clone();
                                        let user_context = user_context.clone();
                                        async move {
                                            serve_mock(req, registry, user_context.as_deref()).await
                                        }
                                    });
                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection error on port {}: {}", port, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept error on port {}: {}", port, e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("REST mock engine on port {} shutting down", port);
                        break;
                    }
                }
            }
        });

        let state = MockServerState {
            running: true,
            port,
        };
        *self.state.write() = state;
        *runtime = Some(EngineRuntime { port, shutdown_tx });

        info!("REST mock engine listening on 127.0.0.1:{}", port);
        Ok(state)
    }

    fn current_state(&self) -> MockServerState {
        *self.state.read()
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        let mut runtime = self.runtime.lock().await;
        let active = runtime.take().ok_or(EngineError::NotRunning)?;

        let _ = active.shutdown_tx.send(());
        *self.state.write() = MockServerState::stopped();
        Ok(())
    }
}

impl StateSource for RestMockEngine {
    fn state(&self) -> MockServerState {
        self.current_state()
    }
}

/// Drop the user-context prefix the proxy inserted into the mock URL.
fn strip_user_context<'a>(path: &'a str, user_context: Option<&str>) -> &'a str {
    let Some(ctx) = user_context.map(|c| c.trim_matches('/')).filter(|c| !c.is_empty()) else {
        return path;
    };

    match path.strip_prefix('/').and_then(|p| p.strip_prefix(ctx)) {
        Some(rest) if rest.is_empty() => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

async fn serve_mock(
    req: Request<hyper::body::Incoming>,
    registry: MockRegistry,
    user_context: Option<&str>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().as_str().to_string();
    let path = strip_user_context(req.uri().path(), user_context).to_string();

    // Intercepted traffic is kept out of the live request log.
    if req.headers().contains_key(&INTERCEPT_HEADER) {
        debug!("Intercepted mock call: {} {}", method, path);
    } else {
        info!("Mock call: {} {}", method, path);
    }

    let snapshot = registry.snapshot();
    match resolver::resolve(&method, &path, &snapshot) {
        Some(mock) => {
            let spec = &mock.response;
            let body = Bytes::copy_from_slice(spec.body.as_bytes());

            let mut res = Response::new(Full::new(body.clone()));
            *res.status_mut() = StatusCode::from_u16(spec.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

            let headers = res.headers_mut();
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
            if let Ok(value) = HeaderValue::from_str(&spec.content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
            for (name, value) in &spec.headers {
                if let (Ok(name), Ok(value)) =
                    (HeaderName::from_str(name), HeaderValue::from_str(value))
                {
                    headers.insert(name, value);
                }
            }

            Ok(res)
        }
        None => {
            debug!("No mock definition for {} {}", method, path);
            Ok(response::build_not_found())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ActiveMock, MockResponseSpec, RestMethod};

    fn registry() -> MockRegistry {
        MockRegistry::new(vec![ActiveMock {
            method: RestMethod::Get,
            path: "/users/:id".to_string(),
            response: MockResponseSpec {
                status: 200,
                content_type: "application/json".to_string(),
                headers: Default::default(),
                body: r#"{"id": 42}"#.to_string(),
            },
        }])
    }

    #[test]
    fn strips_user_context_prefix() {
        assert_eq!(strip_user_context("/bob/users/1", Some("bob")), "/users/1");
        assert_eq!(strip_user_context("/bob", Some("bob")), "/");
        assert_eq!(strip_user_context("/users/1", None), "/users/1");
        // A prefix that is not a whole segment is left alone.
        assert_eq!(strip_user_context("/bobby/users", Some("bob")), "/bobby/users");
    }

    #[tokio::test]
    async fn lifecycle_start_state_shutdown() {
        let engine = RestMockEngine::new(registry());
        assert!(!engine.current_state().running);

        let state = engine
            .start(RestEngineConfig::default())
            .await
            .expect("start failed");
        assert!(state.running);
        assert_ne!(state.port, 0);
        assert_eq!(engine.current_state(), state);

        engine.shutdown().await.expect("shutdown failed");
        assert!(!engine.current_state().running);
    }

    #[tokio::test]
    async fn double_start_fails_explicitly() {
        let engine = RestMockEngine::new(registry());
        let state = engine.start(RestEngineConfig::default()).await.unwrap();

        let err = engine
            .start(RestEngineConfig::default())
            .await
            .expect_err("second start must fail");
        assert!(matches!(err, EngineError::AlreadyRunning(p) if p == state.port));

        // Still running on the original port after the failed start.
        assert_eq!(engine.current_state(), state);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_while_stopped_is_an_error() {
        let engine = RestMockEngine::new(registry());
        assert!(matches!(
            engine.shutdown().await,
            Err(EngineError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn restart_after_shutdown_is_allowed() {
        let engine = RestMockEngine::new(registry());
        engine.start(RestEngineConfig::default()).await.unwrap();
        engine.shutdown().await.unwrap();
        engine.start(RestEngineConfig::default()).await.unwrap();
        engine.shutdown().await.unwrap();
    }
}
