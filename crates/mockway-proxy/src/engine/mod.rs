//! Mock server engine lifecycle.
//!
//! Every protocol engine (REST today; JMS/S3/SMTP engines plug in the same
//! way) implements the same start/state/shutdown contract, so the proxy
//! front end and any control surface can manage heterogeneous listeners
//! identically without depending on a concrete engine type.

mod rest;

pub use rest::{RestEngineConfig, RestMockEngine};

use async_trait::async_trait;
use serde::Serialize;

/// Point-in-time lifecycle state of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MockServerState {
    pub running: bool,
    /// Bound port; meaningful only while running.
    pub port: u16,
}

impl MockServerState {
    pub const fn stopped() -> Self {
        Self {
            running: false,
            port: 0,
        }
    }
}

/// Engine lifecycle failures. These are the one error category that
/// propagates to the control layer instead of degrading fail-soft; an
/// operator must be able to see that an engine did not come up.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is already running on port {0}")]
    AlreadyRunning(u16),
    #[error("engine is not running")]
    NotRunning,
    #[error("failed to bind port {0}: {1}")]
    Bind(u16, std::io::Error),
}

/// Uniform lifecycle contract, parameterized by an engine-specific
/// configuration type.
#[async_trait]
pub trait ServerEngine: Send + Sync {
    type Config: Send;

    /// Start the engine. Calling `start` while already running is a usage
    /// error and fails with [`EngineError::AlreadyRunning`]; it is never
    /// silently ignored.
    async fn start(&self, config: Self::Config) -> Result<MockServerState, EngineError>;

    /// Current lifecycle state; callable at any time, race-free against
    /// concurrent `start`/`shutdown`.
    fn current_state(&self) -> MockServerState;

    /// Stop the engine and release its listener.
    async fn shutdown(&self) -> Result<(), EngineError>;
}

/// Read-only view of an engine's state, for components that only ever need
/// to ask "is it up, and where" (the proxy front end targeting the mock
/// engine).
pub trait StateSource: Send + Sync {
    fn state(&self) -> MockServerState;
}
