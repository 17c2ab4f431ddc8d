//! ProxyServer struct and accept loop.

use super::handler::{handle_request, ProxyContext};
use crate::config::Config;
use crate::dispatch::{create_http_client, Dispatcher, HttpClient};
use crate::engine::StateSource;
use crate::registry::MockRegistry;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// The intercepting proxy front end.
///
/// One logical worker per inbound connection; each request resolves
/// independently against a registry snapshot taken at the start of its own
/// resolution.
pub struct ProxyServer {
    config: Arc<Config>,
    registry: MockRegistry,
    mock_state: Arc<dyn StateSource>,
    dispatcher: Dispatcher,
    client: HttpClient,
}

impl ProxyServer {
    pub fn new(config: Arc<Config>, registry: MockRegistry, mock_state: Arc<dyn StateSource>) -> Self {
        let client = create_http_client(&config.connection_pool);
        let dispatcher = Dispatcher::with_client(
            client.clone(),
            Duration::from_secs(config.dispatch.timeout_secs),
        );

        Self {
            config,
            registry,
            mock_state,
            dispatcher,
            client,
        }
    }

    /// Bind the configured port and serve until the task is dropped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen.port));
        let listener = TcpListener::bind(addr).await?;
        info!("Intercepting proxy listening on {}", addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Serving {} active mock definitions", self.registry.len());

        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move {
                        let ctx = ProxyContext {
                            dispatcher: &server.dispatcher,
                            client: &server.client,
                            registry: &server.registry,
                            mock_state: server.mock_state.as_ref(),
                            user_context: server.config.engine.user_context.as_deref(),
                            upstream_scheme: &server.config.dispatch.upstream_scheme,
                        };
                        handle_request(&ctx, req).await
                    }
                });

                // A failed connection must never take the listener down.
                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    debug!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }
    }
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("listen_port", &self.config.listen.port)
            .field("mocks", &self.registry.len())
            .finish()
    }
}
