//! Admin API: read-only views of the gateway, behind a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::accounting::ConnectionAccountant;
use crate::control::ControlHandle;
use crate::routing::RoutingTable;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub table: Arc<RoutingTable>,
    pub accountant: Arc<dyn ConnectionAccountant>,
    pub control: ControlHandle,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(
        table: Arc<RoutingTable>,
        accountant: Arc<dyn ConnectionAccountant>,
        control: ControlHandle,
        api_key: &str,
    ) -> Self {
        Self {
            table,
            accountant,
            control,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/routes/{domain}/connections", get(get_connections))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
