// src/health/probe.rs
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::warn;
use url::Url;

/// Reachability check used by the health checker.
#[async_trait]
pub trait Probe: Send + Sync {
    /// `true` if the endpoint is reachable within `timeout`.
    async fn probe(&self, url: &Url, timeout: Duration) -> bool;
}

/// Alive if a TCP connection to the backend's host:port can be opened.
/// Says nothing about HTTP-level health.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, url: &Url, connect_timeout: Duration) -> bool {
        let (host, port) = match (url.host_str(), url.port_or_known_default()) {
            (Some(host), Some(port)) => (host, port),
            _ => {
                warn!(%url, "Site unreachable, error: no host or port");
                return false;
            }
        };

        match timeout(connect_timeout, TcpStream::connect(format!("{}:{}", host, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                warn!(%url, %err, "Site unreachable");
                false
            }
            Err(_) => {
                warn!(%url, ?connect_timeout, "Site unreachable, error: connect timed out");
                false
            }
        }
    }
}
