// Library exports for integration tests and embedding.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod matcher;
pub mod outbound;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod response;
