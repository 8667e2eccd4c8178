// src/main.rs
use anyhow::{Context, Result};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use rr_balancer::{
    config,
    health::{HealthChecker, TcpProbe},
    metrics::MetricsRegistry,
    proxy::{Proxy, ServerPool},
    retry::RetryPolicy,
    server::{RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rr_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Initialize metrics
    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    // Build the backend pool; it is read-only from here on
    let pool = Arc::new(ServerPool::from_config(&config.backends, &config.forward));
    metrics.update_backend_counts(pool.len(), pool.len());

    let proxy = Arc::new(Proxy::new(
        pool.clone(),
        RetryPolicy::new(config.retry.clone()),
        Some(metrics.clone()),
    ));

    // Start health checker
    let health_checker = Arc::new(HealthChecker::new(
        config.health_check.clone(),
        pool,
        Arc::new(TcpProbe),
        Some(metrics),
    ));
    let health_task = tokio::spawn(health_checker.clone().start());

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, metrics_registry, config.metrics.path.clone());
    }

    // Start main server
    let host: IpAddr = config
        .listen
        .host
        .parse()
        .with_context(|| format!("Invalid listen host {}", config.listen.host))?;
    let addr = SocketAddr::new(host, config.listen.port);
    info!("Load Balancer started at {}", addr);

    ServerBuilder::new(addr)
        .with_handler(RequestHandler::new(proxy))
        .serve_with_shutdown(shutdown_signal())
        .await?;

    health_checker.shutdown();
    health_task.await?;
    info!("Load balancer stopped");

    Ok(())
}

fn start_metrics_server(addr: SocketAddr, registry: MetricsRegistry, path: String) {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() != path.as_str() {
                        let mut resp = Response::new(Body::from("Not Found"));
                        *resp.status_mut() = StatusCode::NOT_FOUND;
                        return Ok::<_, Infallible>(resp);
                    }

                    let mut resp = Response::new(Body::from(registry.gather()));
                    resp.headers_mut().insert(
                        hyper::header::CONTENT_TYPE,
                        hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                    );
                    Ok(resp)
                }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_service),
        Err(e) => {
            error!("Metrics server failed to bind {}: {}", addr, e);
            return;
        }
    };

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
