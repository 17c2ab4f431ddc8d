//! Dispatcher and connection-pool configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Upper bound on any single outbound call, mock or upstream. A hung
    /// target must not occupy a worker indefinitely.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Scheme assumed when an origin-form inbound request has to be rebuilt
    /// into an absolute upstream URL.
    #[serde(default = "default_upstream_scheme")]
    pub upstream_scheme: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            upstream_scheme: default_upstream_scheme(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_upstream_scheme() -> String {
    "http".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}
