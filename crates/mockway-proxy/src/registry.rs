//! Active mock definitions and the registry snapshot handle.
//!
//! The registry is owned by whatever control layer seeds it (the YAML config
//! in the bundled binary, a persistence layer when embedded). The
//! interception core only ever sees immutable snapshots.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP methods eligible for mocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RestMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl RestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestMethod::Get => "GET",
            RestMethod::Post => "POST",
            RestMethod::Put => "PUT",
            RestMethod::Delete => "DELETE",
            RestMethod::Patch => "PATCH",
        }
    }

    /// Case-insensitive comparison against a wire-level method name.
    pub fn matches(&self, method: &str) -> bool {
        method.eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for RestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid / unsupported method: {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for RestMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(RestMethod::Get),
            "POST" => Ok(RestMethod::Post),
            "PUT" => Ok(RestMethod::Put),
            "DELETE" => Ok(RestMethod::Delete),
            "PATCH" => Ok(RestMethod::Patch),
            other => Err(UnsupportedMethod(other.to_string())),
        }
    }
}

/// Canned response served by the mock engine.
///
/// Opaque to the interception core: the proxy forwards matched traffic to the
/// engine and relays whatever the engine produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockResponseSpec {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl Default for MockResponseSpec {
    fn default() -> Self {
        Self {
            status: default_status(),
            content_type: default_content_type(),
            headers: HashMap::new(),
            body: String::new(),
        }
    }
}

/// A currently enabled mock rule eligible for matching against inbound
/// traffic. Path templates may contain `:name` variable segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveMock {
    pub method: RestMethod,
    pub path: String,
    #[serde(default)]
    pub response: MockResponseSpec,
}

/// Shared handle over the ordered list of active mocks.
///
/// `snapshot` hands out the whole list as one `Arc`; `replace` swaps the Arc
/// under a short write lock. An in-flight resolution keeps the snapshot it
/// started with, so it sees either the old or the new list, never a partial
/// update.
#[derive(Clone, Default)]
pub struct MockRegistry {
    inner: Arc<RwLock<Arc<[ActiveMock]>>>,
}

impl MockRegistry {
    pub fn new(mocks: Vec<ActiveMock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(mocks.into())),
        }
    }

    /// Point-in-time view of the registry, in registration order.
    pub fn snapshot(&self) -> Arc<[ActiveMock]> {
        Arc::clone(&self.inner.read())
    }

    /// Replace the registry contents wholesale.
    pub fn replace(&self, mocks: Vec<ActiveMock>) {
        *self.inner.write() = mocks.into();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
