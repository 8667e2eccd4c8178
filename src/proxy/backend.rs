// src/proxy/backend.rs
use hyper::{Body, Request};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use super::forward::{Forward, ForwardOutcome};

/// One upstream server. Only the liveness flag changes after construction.
pub struct Backend {
    pub id: String,
    pub url: Url,
    alive: RwLock<bool>,
    forwarder: Arc<dyn Forward>,
}

impl Backend {
    /// Backends start out alive; the first health check corrects that if needed.
    pub fn new(url: Url, forwarder: Arc<dyn Forward>) -> Self {
        let id = format!(
            "{}:{}",
            url.host_str().unwrap_or("unknown"),
            url.port_or_known_default().unwrap_or(80)
        );

        Self {
            id,
            url,
            alive: RwLock::new(true),
            forwarder,
        }
    }

    pub async fn set_alive(&self, alive: bool) {
        *self.alive.write().await = alive;
    }

    /// Snapshot of the liveness flag; it may change right after this returns.
    pub async fn is_alive(&self) -> bool {
        *self.alive.read().await
    }

    pub async fn forward(&self, req: Request<Body>) -> ForwardOutcome {
        self.forwarder.forward(req).await
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}
