//
// src/proxy/mod.rs
//
mod backend;
mod forward;
mod pool;
mod proxy;
mod request;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::Backend;
pub use forward::{http_client, Forward, ForwardOutcome, HttpForwarder};
pub use pool::{HealthCheckResult, ServerPool};
pub use proxy::{Proxy, ProxyError};
pub use request::{ClientAddr, ProxyRequest};
