// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::health::Probe;
use crate::metrics::MetricsCollector;
use crate::proxy::{HealthCheckResult, ServerPool};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

/// Periodically probes every backend in the pool until shut down.
pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<ServerPool>,
    probe: Arc<dyn Probe>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<ServerPool>,
        probe: Arc<dyn Probe>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            pool,
            probe,
            metrics,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Run until `shutdown` is called. The first cycle fires one interval in.
    pub async fn start(self: Arc<Self>) {
        let period = self.config.interval();
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!("Starting health checker with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_all_backends().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One full pass over the pool.
    pub async fn check_all_backends(&self) -> Vec<HealthCheckResult> {
        info!("Starting health check...");

        let results = self
            .pool
            .health_check(self.probe.as_ref(), self.config.timeout())
            .await;
        let healthy = results.iter().filter(|r| r.alive).count();

        if let Some(metrics) = &self.metrics {
            for result in &results {
                metrics.update_backend_health(&result.backend_id, result.alive);
            }
            metrics.update_backend_counts(healthy, results.len());
        }

        info!(
            "Health check completed: {} up, {} down",
            healthy,
            results.len() - healthy
        );
        results
    }
}
