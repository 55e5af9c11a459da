use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::accounting::ConnectionAccountant;
use crate::admin::AdminState;
use crate::control::ConnectionState;
use crate::routing::validation::canonical_domain;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routing_version: u64,
    pub routes: usize,
    pub control: ConnectionState,
    pub updates_applied: u64,
    pub updates_rejected: u64,
}

#[derive(Debug, Serialize)]
pub struct RouteStatus {
    pub domain: String,
    pub strategy: &'static str,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EndpointConnections {
    pub endpoint: String,
    /// `None` when the accountant could not answer.
    pub connections: Option<u64>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.table.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routing_version: snapshot.version(),
        routes: snapshot.len(),
        control: state.control.state(),
        updates_applied: state.control.applied(),
        updates_rejected: state.control.rejected(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteStatus>> {
    let routes = state
        .table
        .snapshot()
        .pools()
        .iter()
        .map(|pool| RouteStatus {
            domain: pool.domain().to_string(),
            strategy: pool.strategy().as_str(),
            endpoints: pool.endpoints().iter().map(|e| e.key().to_string()).collect(),
        })
        .collect();
    Json(routes)
}

pub async fn get_connections(
    State(state): State<AdminState>,
    Path(domain): Path<String>,
) -> Result<Json<Vec<EndpointConnections>>, (StatusCode, String)> {
    let pool = state
        .table
        .lookup(&canonical_domain(&domain))
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    let mut counts = Vec::with_capacity(pool.endpoints().len());
    for endpoint in pool.endpoints() {
        let connections = match state.accountant.current_count(endpoint.key()).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Connection count unavailable");
                None
            }
        };
        counts.push(EndpointConnections {
            endpoint: endpoint.key().to_string(),
            connections,
        });
    }
    Ok(Json(counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::MemoryAccountant;
    use crate::admin::setup_admin_router;
    use crate::control::ControlHandle;
    use crate::routing::{RouteEntry, RoutingTable, Strategy};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> (AdminState, Arc<MemoryAccountant>) {
        let table = Arc::new(
            RoutingTable::from_routes(&[
                RouteEntry::new("a.test", ["http://e1", "http://e2"], Strategy::RoundRobin),
                RouteEntry::new("b.test", ["http://x"], Strategy::LeastConnections),
            ])
            .unwrap(),
        );
        let accountant = Arc::new(MemoryAccountant::in_memory(Duration::from_secs(3600), Duration::from_secs(1)));
        let state = AdminState::new(table, accountant.clone(), ControlHandle::detached(), "secret");
        (state, accountant)
    }

    fn get(path: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let (state, _) = state();
        let router = setup_admin_router(state);

        for key in [None, Some("wrong")] {
            let response = router.clone().oneshot(get("/admin/status", key)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_status_and_routes() {
        let (state, _) = state();
        let router = setup_admin_router(state);

        let status = json(router.clone().oneshot(get("/admin/status", Some("secret"))).await.unwrap()).await;
        assert_eq!(status["routes"], 2);
        assert_eq!(status["control"], "disconnected");

        let routes = json(router.oneshot(get("/admin/routes", Some("secret"))).await.unwrap()).await;
        assert_eq!(routes[0]["domain"], "a.test");
        assert_eq!(routes[0]["endpoints"][1], "http://e2/");
        assert_eq!(routes[1]["strategy"], "least-connections");
    }

    #[tokio::test]
    async fn test_connections_per_endpoint() {
        let (state, accountant) = state();
        accountant.record_connection("http://e2/").await.unwrap();
        accountant.record_connection("http://e2/").await.unwrap();
        let router = setup_admin_router(state);

        let body = json(
            router
                .clone()
                .oneshot(get("/admin/routes/A.test/connections", Some("secret")))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body[0]["connections"], 0);
        assert_eq!(body[1]["connections"], 2);

        let missing = router
            .oneshot(get("/admin/routes/nope.test/connections", Some("secret")))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
