// src/proxy/request.rs
use hyper::body::Bytes;
use hyper::{Body, HeaderMap, Method, Request, Uri, Version};
use std::net::SocketAddr;
use uuid::Uuid;

use super::ProxyError;

/// Peer address of the inbound connection, attached to each request by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// A buffered inbound request plus its failover/retry counters.
///
/// The body is read once so the same request can be rebuilt for every local
/// retry and every failover. Counters live only as long as the request does.
#[derive(Debug)]
pub struct ProxyRequest {
    pub id: Uuid,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    client_addr: Option<SocketAddr>,
    /// Backends abandoned so far.
    pub attempts: u32,
    /// Retries against the current backend.
    pub retries: u32,
}

impl ProxyRequest {
    pub async fn from_request(req: Request<Body>) -> Result<Self, ProxyError> {
        let (parts, body) = req.into_parts();
        let body = hyper::body::to_bytes(body)
            .await
            .map_err(ProxyError::InvalidRequest)?;

        Ok(Self {
            id: Uuid::new_v4(),
            client_addr: parts.extensions.get::<ClientAddr>().map(|addr| addr.0),
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            attempts: 0,
            retries: 0,
        })
    }

    /// Rebuild a fresh `Request` for one forwarding attempt.
    pub fn build(&self) -> Request<Body> {
        let mut req = Request::new(Body::from(self.body.clone()));
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.version_mut() = self.version;
        *req.headers_mut() = self.headers.clone();
        if let Some(addr) = self.client_addr {
            req.extensions_mut().insert(ClientAddr(addr));
        }
        req
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Move on to another backend, which gets a fresh retry budget.
    pub fn record_failover(&mut self) {
        self.attempts += 1;
        self.retries = 0;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }
}
