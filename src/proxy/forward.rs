// ────────────────────────────────
// src/proxy/forward.rs
// Relays one request to one backend. Knows nothing about retries.
// ────────────────────────────────
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{HeaderName, HeaderValue, CONNECTION};
use hyper::{Body, Client, HeaderMap, Request, Response, Uri, Version};
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

use super::request::ClientAddr;
use super::ProxyError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Result of a single forwarding attempt, inspected by the dispatcher.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// The backend answered; whatever its status, the response goes to the client.
    Success(Response<Body>),
    /// Transport failure worth retrying or failing over.
    Recoverable(ProxyError),
    /// The request cannot be sent to this backend at all.
    Fatal(ProxyError),
}

#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, req: Request<Body>) -> ForwardOutcome;
}

/// Shared hyper client used by every backend's forwarder.
pub fn http_client(connect_timeout: Duration) -> Client<HttpConnector, Body> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    Client::builder().build(connector)
}

/// Single-host reverse proxy over a hyper client.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    target: Url,
    client: Client<HttpConnector, Body>,
}

impl HttpForwarder {
    pub fn new(target: Url, client: Client<HttpConnector, Body>) -> Self {
        Self { target, client }
    }

    /// Point `uri` at the target, joining base path and query strings.
    fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let host = self
            .target
            .host_str()
            .ok_or_else(|| ProxyError::Backend(format!("{} has no host", self.target)))?;
        let port = self
            .target
            .port_or_known_default()
            .ok_or_else(|| ProxyError::Backend(format!("{} has no port", self.target)))?;

        let mut rewritten = format!(
            "{}://{}:{}{}",
            self.target.scheme(),
            host,
            port,
            join_paths(self.target.path(), uri.path())
        );
        if let Some(query) = join_queries(self.target.query(), uri.query()) {
            rewritten.push('?');
            rewritten.push_str(&query);
        }

        rewritten
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| ProxyError::Backend(e.to_string()))
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    async fn forward(&self, mut req: Request<Body>) -> ForwardOutcome {
        let uri = match self.rewrite_uri(req.uri()) {
            Ok(uri) => uri,
            Err(e) => return ForwardOutcome::Fatal(e),
        };
        *req.uri_mut() = uri;
        *req.version_mut() = Version::HTTP_11;

        strip_hop_by_hop(req.headers_mut());
        if let Some(ClientAddr(addr)) = req.extensions().get::<ClientAddr>().copied() {
            append_forwarded_for(req.headers_mut(), addr.ip());
        }

        match self.client.request(req).await {
            Ok(mut resp) => {
                strip_hop_by_hop(resp.headers_mut());
                ForwardOutcome::Success(resp)
            }
            Err(e) => ForwardOutcome::Recoverable(ProxyError::Upstream(e)),
        }
    }
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn join_queries(base: Option<&str>, query: Option<&str>) -> Option<String> {
    match (base.filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, ip),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
