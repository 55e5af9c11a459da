//! Per-request dispatch: domain → pool → endpoint → forward.
//!
//! # Responsibilities
//! - Resolve the target domain against the current routing snapshot
//! - Ask the selector for an endpoint and count the dispatch
//! - Hand the request to the forwarder and map failures to statuses
//!
//! # Design Decisions
//! - The snapshot is read once per request; a concurrent update never
//!   changes the pool mid-request
//! - The dispatch is counted before forwarding and never taken back
//! - Accounting trouble degrades balancing quality, not availability

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::HeaderName, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

use crate::accounting::{ConnectionAccountant, MemoryAccountant};
use crate::http::forward::{Forwarder, TransportError};
use crate::http::request::{request_id, target_domain};
use crate::load_balancer::{SelectionError, Selector};
use crate::routing::{NotFound, RoutingTable};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Why a request was answered by the gateway itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request has no host")]
    MissingHost,

    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingHost => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Selection(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let body = match &self {
            GatewayError::MissingHost => "Missing Host header".to_string(),
            GatewayError::NotFound(e) => format!("No route for {}", e.0),
            GatewayError::Selection(_) => "No endpoint available".to_string(),
            GatewayError::Transport(TransportError::Timeout(_)) => "Upstream timed out".to_string(),
            GatewayError::Transport(_) => "Upstream request failed".to_string(),
        };
        (self.status(), body).into_response()
    }
}

/// Everything a request needs, shared across requests.
#[derive(Clone)]
pub struct Gateway {
    table: Arc<RoutingTable>,
    selector: Arc<Selector>,
    accountant: Arc<dyn ConnectionAccountant>,
    client_rates: Arc<MemoryAccountant>,
    forwarder: Arc<dyn Forwarder>,
}

impl Gateway {
    pub fn new(
        table: Arc<RoutingTable>,
        accountant: Arc<dyn ConnectionAccountant>,
        client_rates: Arc<MemoryAccountant>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            table,
            selector: Arc::new(Selector::new()),
            accountant,
            client_rates,
            forwarder,
        }
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    pub fn accountant(&self) -> &Arc<dyn ConnectionAccountant> {
        &self.accountant
    }

    /// Route one request. `client` is the peer address, when known.
    pub async fn handle(&self, mut request: Request<Body>, client: Option<SocketAddr>) -> Result<Response<Body>, GatewayError> {
        let request_id = request_id(request.headers()).to_string();
        let domain = target_domain(request.headers(), request.uri()).ok_or(GatewayError::MissingHost)?;

        let pool = self.table.lookup(&domain).inspect_err(|_| {
            tracing::warn!(request_id = %request_id, domain = %domain, "No route for domain");
        })?;

        let endpoint = self
            .selector
            .select(&pool, self.accountant.as_ref())
            .await
            .inspect_err(|e| {
                tracing::error!(request_id = %request_id, domain = %domain, error = %e, "Endpoint selection failed");
            })?;

        match self.accountant.record_connection(endpoint.key()).await {
            Ok(count) => tracing::debug!(
                request_id = %request_id,
                endpoint = %endpoint,
                window_count = count,
                "Dispatch recorded"
            ),
            Err(e) => tracing::warn!(
                request_id = %request_id,
                endpoint = %endpoint,
                error = %e,
                "Failed to record dispatch"
            ),
        }

        if let Some(client) = client {
            let ip = client.ip().to_string();
            if let Err(e) = self.client_rates.record_connection(&ip).await {
                tracing::debug!(client = %ip, error = %e, "Failed to record client rate");
            }
            append_forwarded_for(&mut request, &ip);
        }

        tracing::debug!(
            request_id = %request_id,
            domain = %domain,
            endpoint = %endpoint,
            strategy = %pool.strategy(),
            method = %request.method(),
            path = %request.uri().path(),
            "Forwarding request"
        );

        self.forwarder.forward(request, &endpoint).await.map_err(|e| {
            tracing::warn!(request_id = %request_id, endpoint = %endpoint, error = %e, "Upstream error");
            GatewayError::from(e)
        })
    }
}

fn append_forwarded_for(request: &mut Request<Body>, ip: &str) {
    let headers = request.headers_mut();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
