use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mockway_proxy::config::Config;
use mockway_proxy::engine::{RestEngineConfig, RestMockEngine, ServerEngine};
use mockway_proxy::proxy::ProxyServer;
use mockway_proxy::registry::MockRegistry;

#[derive(Parser, Debug)]
#[command(name = "mockway-proxy")]
#[command(about = "Intercepting proxy that answers matched traffic with canned mock responses")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "mockway.yaml")]
    config: String,

    /// Override the configured listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_file(&args.config)?;
    if let Some(port) = args.port {
        config.listen.port = port;
    }

    let registry = MockRegistry::new(config.mocks.clone());
    info!("Loaded {} mock definitions", registry.len());

    let engine = Arc::new(RestMockEngine::new(registry.clone()));
    let state = engine
        .start(RestEngineConfig {
            port: config.engine.port,
            user_context: config.engine.user_context.clone(),
        })
        .await?;
    info!("REST mock engine up on port {}", state.port);

    let server = ProxyServer::new(Arc::new(config), registry, engine.clone());

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            engine.shutdown().await?;
        }
    }

    Ok(())
}
