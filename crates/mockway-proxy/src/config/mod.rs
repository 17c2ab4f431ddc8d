//! Configuration types for the mockway proxy.

mod dispatch;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::registry::ActiveMock;

#[allow(unused_imports)]
pub use dispatch::{ConnectionPoolConfig, DispatchConfig};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: ListenConfig,

    /// REST mock engine settings. The engine is started alongside the proxy
    /// and targeted over loopback for matched traffic.
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    /// Ordered list of active mocks seeding the registry. Registration order
    /// is resolution order.
    #[serde(default)]
    pub mocks: Vec<ActiveMock>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Port the intercepting proxy listens on.
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Port for the REST mock engine. 0 lets the OS assign one.
    #[serde(default)]
    pub port: u16,

    /// Optional per-user path prefix inserted into the mock loopback URL and
    /// stripped again by the engine before resolving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            port: 0,
            user_context: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.dispatch.upstream_scheme.as_str() {
            "http" | "https" => {}
            other => anyhow::bail!(
                "Unsupported upstream scheme: '{other}'. Supported: http, https"
            ),
        }

        if self.dispatch.timeout_secs == 0 {
            anyhow::bail!("dispatch.timeout_secs must be greater than zero");
        }

        if let Some(ctx) = &self.engine.user_context {
            if ctx.trim_matches('/').contains('/') {
                anyhow::bail!("engine.user_context must be a single path segment");
            }
        }

        Ok(())
    }
}
