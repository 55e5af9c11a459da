//! Forwarding a request to one endpoint.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the chosen endpoint
//! - Rewrite `Host`, record `x-forwarded-host`, drop hop-by-hop headers
//! - Stream bodies both ways
//! - Bound the wait for upstream response headers
//!
//! # Design Decisions
//! - One attempt per request; a failed endpoint is reported, never retried
//!   against a sibling
//! - Upstream connections are plain HTTP/1.1, pooled by the hyper client

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::Position;

use crate::routing::Endpoint;

/// Failure to obtain a response from an endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("request cannot be forwarded: {0}")]
    InvalidRequest(String),
}

/// Sends a request to an endpoint and returns its response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: Request<Body>, endpoint: &Endpoint) -> Result<Response<Body>, TransportError>;
}

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

// RFC 9110 §7.6.1
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwarder backed by a pooled hyper client.
#[derive(Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperForwarder {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(&self, request: Request<Body>, endpoint: &Endpoint) -> Result<Response<Body>, TransportError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = upstream_uri(endpoint, &parts.uri)?;
        parts.version = Version::HTTP_11;

        let original_host = parts.headers.get(header::HOST).cloned();
        strip_hop_by_hop(&mut parts.headers);
        if let Some(host) = original_host {
            parts.headers.insert(X_FORWARDED_HOST, host);
        }
        let authority = &endpoint.url()[Position::BeforeHost..Position::AfterPort];
        let host = HeaderValue::from_str(authority).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        parts.headers.insert(header::HOST, host);

        let upstream = Request::from_parts(parts, body);
        match tokio::time::timeout(self.timeout, self.client.request(upstream)).await {
            Ok(Ok(response)) => Ok(into_downstream(response)),
            Ok(Err(e)) => Err(TransportError::Upstream(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}

/// Upstream response with connection-scoped headers removed, body streamed through.
fn into_downstream(response: hyper::Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// `endpoint origin + endpoint base path + request path and query`.
pub fn upstream_uri(endpoint: &Endpoint, original: &Uri) -> Result<Uri, TransportError> {
    let url = endpoint.url();
    let origin = &url[..Position::BeforePath];
    let base = url.path().trim_end_matches('/');
    let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("{origin}{base}{path_and_query}")
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| TransportError::InvalidRequest(e.to_string()))
}

/// Remove connection-scoped headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
