// ────────────────────────────────
// src/proxy/proxy.rs
// Per-request dispatch: pick a peer, forward, retry locally, fail over.
// ────────────────────────────────

use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::backend::Backend;
use super::forward::ForwardOutcome;
use super::pool::ServerPool;
use super::request::ProxyRequest;
use crate::metrics::MetricsCollector;
use crate::retry::{RetryDecision, RetryPolicy};

pub struct Proxy {
    pool: Arc<ServerPool>,
    policy: RetryPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

enum DispatchState {
    Dispatch,
    Forward(Arc<Backend>),
    LocalRetry(Arc<Backend>),
    Failover(Arc<Backend>),
    Exhausted(ProxyError),
}

impl Proxy {
    pub fn new(
        pool: Arc<ServerPool>,
        policy: RetryPolicy,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            pool,
            policy,
            metrics,
        }
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let start = Instant::now();
        let record = ProxyRequest::from_request(req).await?;

        let span = info_span!(
            "request",
            id = %record.id,
            method = %record.method(),
            path = %record.uri().path(),
        );
        let result = self.dispatch(record).instrument(span).await;

        if let Some(metrics) = &self.metrics {
            let status = match &result {
                Ok(resp) => resp.status(),
                Err(e) => e.status(),
            };
            metrics.record_request(status.as_u16(), start.elapsed());
        }

        result
    }

    /// Drive one request through dispatch, local retries and failovers.
    pub async fn dispatch(&self, mut record: ProxyRequest) -> Result<Response<Body>, ProxyError> {
        let mut state = DispatchState::Dispatch;

        loop {
            state = match state {
                DispatchState::Dispatch => {
                    if self.policy.attempts_exhausted(record.attempts) {
                        warn!(
                            client = ?record.client_addr(),
                            attempts = record.attempts,
                            "Max attempts reached, terminating"
                        );
                        DispatchState::Exhausted(ProxyError::AttemptsExhausted(record.attempts))
                    } else {
                        match self.pool.get_next_peer().await {
                            Some(backend) => DispatchState::Forward(backend),
                            None => DispatchState::Exhausted(ProxyError::NoHealthyBackends),
                        }
                    }
                }

                DispatchState::Forward(backend) => {
                    let started = Instant::now();
                    let outcome = backend.forward(record.build()).await;
                    let success = matches!(outcome, ForwardOutcome::Success(_));
                    if let Some(metrics) = &self.metrics {
                        metrics.record_backend_request(&backend.id, success, started.elapsed());
                    }

                    match outcome {
                        ForwardOutcome::Success(resp) => {
                            debug!(backend = %backend.id, status = %resp.status(), "forwarded");
                            return Ok(resp);
                        }
                        ForwardOutcome::Fatal(err) => {
                            error!(backend = %backend.id, %err, "cannot forward request");
                            return Err(err);
                        }
                        ForwardOutcome::Recoverable(err) => {
                            warn!(backend = %backend.id, %err, "forwarding failed");
                            match self.policy.decide(record.retries) {
                                RetryDecision::Retry => DispatchState::LocalRetry(backend),
                                RetryDecision::Failover => DispatchState::Failover(backend),
                            }
                        }
                    }
                }

                DispatchState::LocalRetry(backend) => {
                    sleep(self.policy.retry_delay()).await;
                    record.record_retry();
                    debug!(backend = %backend.id, retry = record.retries, "retrying same backend");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry(&backend.id);
                    }
                    DispatchState::Forward(backend)
                }

                DispatchState::Failover(backend) => {
                    self.pool.mark_backend_status(&backend.url, false).await;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failover(&backend.id);
                        metrics.update_backend_health(&backend.id, false);
                    }
                    info!(
                        backend = %backend.id,
                        client = ?record.client_addr(),
                        "Attempting retry {}",
                        record.attempts
                    );
                    record.record_failover();
                    DispatchState::Dispatch
                }

                DispatchState::Exhausted(err) => return Err(err),
            };
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Max attempts ({0}) reached")]
    AttemptsExhausted(u32),

    #[error("Upstream error: {0}")]
    Upstream(#[source] hyper::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[source] hyper::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends | ProxyError::AttemptsExhausted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::Upstream(_) | ProxyError::Backend(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

// Clients only ever see the status text, never which backend failed.
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let status = err.status();
        let message = match status {
            StatusCode::SERVICE_UNAVAILABLE => "Service not available",
            StatusCode::BAD_REQUEST => "Bad request",
            _ => "Bad gateway",
        };

        let mut resp = Response::new(Body::from(message));
        *resp.status_mut() = status;
        resp
    }
}
