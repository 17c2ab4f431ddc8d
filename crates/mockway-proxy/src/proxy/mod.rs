//! Intercepting proxy front end.
//!
//! Sits between client and destination. For each inbound request it either
//! substitutes the response of a matched mock (dispatched to the mock engine
//! over loopback) or passes the request through to its original destination.
//! CONNECT/OPTIONS/TRACE are never mock-resolved; they tunnel or forward
//! as-is.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct and accept loop
//! - `handler` - per-request orchestration and fail-soft degradation

mod handler;
mod server;


pub use handler::{is_excluded_method, ProxyContext};
pub use server::ProxyServer;
