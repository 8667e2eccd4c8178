//
// src/proxy/pool.rs
//

use super::backend::Backend;
use super::forward::{http_client, HttpForwarder};
use crate::config::{BackendConfig, ForwardConfig};
use crate::health::Probe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Ordered backends plus a shared rotation cursor.
///
/// The backend list is fixed once the pool is shared: `add_backend` needs
/// `&mut self`, everything else works through `&self`.
#[derive(Debug, Default)]
pub struct ServerPool {
    backends: Vec<Arc<Backend>>,
    current: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub url: Url,
    pub alive: bool,
}

impl ServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pool from configuration, one hyper-backed forwarder per backend.
    pub fn from_config(configs: &[BackendConfig], forward: &ForwardConfig) -> Self {
        let client = http_client(forward.connect_timeout());
        let mut pool = Self::new();

        for config in configs {
            let forwarder = HttpForwarder::new(config.url.clone(), client.clone());
            pool.add_backend(Backend::new(config.url.clone(), Arc::new(forwarder)));
            tracing::info!("Configured server: {}", config.url);
        }

        pool
    }

    pub fn add_backend(&mut self, backend: Backend) {
        self.backends.push(Arc::new(backend));
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Advance the cursor and map its previous value onto the pool.
    pub fn next_index(&self) -> usize {
        match self.backends.len() {
            0 => 0,
            len => self.current.fetch_add(1, Ordering::Relaxed) % len,
        }
    }

    /// Round robin that skips backends not currently alive.
    pub async fn get_next_peer(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        if len == 0 {
            return None;
        }

        let next = self.next_index();
        for offset in 0..len {
            let idx = (next + offset) % len;
            let backend = &self.backends[idx];
            if backend.is_alive().await {
                if offset != 0 {
                    // Racy with concurrent callers; only a fairness hint.
                    self.current.store(idx + 1, Ordering::Relaxed);
                }
                return Some(backend.clone());
            }
        }

        None
    }

    /// Probe every backend once, in order, and record the result.
    pub async fn health_check(&self, probe: &dyn Probe, timeout: Duration) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let alive = probe.probe(&backend.url, timeout).await;
            backend.set_alive(alive).await;

            let status = if alive { "up" } else { "down" };
            tracing::info!(backend = %backend.id, "{} [{}]", backend.url, status);

            results.push(HealthCheckResult {
                backend_id: backend.id.clone(),
                url: backend.url.clone(),
                alive,
            });
        }

        results
    }

    pub async fn mark_backend_status(&self, url: &Url, alive: bool) {
        if let Some(backend) = self.backends.iter().find(|b| &b.url == url) {
            backend.set_alive(alive).await;
        }
    }

    pub async fn alive_count(&self) -> usize {
        let mut count = 0;
        for backend in &self.backends {
            if backend.is_alive().await {
                count += 1;
            }
        }
        count
    }
}
