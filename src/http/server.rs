//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the routing table, accountant and forwarder from config
//! - Create the Axum router and wire up middleware (timeout, request ID, tracing)
//! - Spawn background tasks: control channel, config reload, accounting sweep, admin API
//! - Serve until the shutdown signal, then drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::accounting::{self, AccountingError, ConnectionAccountant, MemoryAccountant};
use crate::admin::{setup_admin_router, AdminState};
use crate::config::ProxyConfig;
use crate::control::{ControlChannelClient, ControlHandle};
use crate::http::forward::HyperForwarder;
use crate::http::gateway::Gateway;
use crate::http::request::{request_id, MakeRequestUuidV4};
use crate::routing::{RoutingTable, ValidationError};

/// Startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("initial routes rejected: {0}")]
    Routes(#[from] ValidationError),

    #[error("accountant setup failed: {0}")]
    Accounting(#[from] AccountingError),
}

/// HTTP server for the gateway.
pub struct HttpServer {
    config: ProxyConfig,
    gateway: Gateway,
    client_rates: Arc<MemoryAccountant>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let table = Arc::new(RoutingTable::from_routes(&config.routes)?);
        let accountant = accounting::from_config(&config.accounting)?;
        let client_rates = Arc::new(MemoryAccountant::in_memory(
            Duration::from_millis(config.accounting.window_ms),
            Duration::from_millis(config.accounting.query_timeout_ms),
        ));
        let forwarder = Arc::new(HyperForwarder::new(Duration::from_secs(config.timeouts.upstream_secs)));

        tracing::info!(
            routes = table.snapshot().len(),
            upstream_timeout_secs = config.timeouts.upstream_secs,
            "Gateway initialised"
        );

        let gateway = Gateway::new(table, accountant, Arc::clone(&client_rates), forwarder);
        Ok(Self {
            config,
            gateway,
            client_rates,
        })
    }

    pub fn table(&self) -> Arc<RoutingTable> {
        Arc::clone(self.gateway.table())
    }

    pub fn accountant(&self) -> Arc<dyn ConnectionAccountant> {
        Arc::clone(self.gateway.accountant())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.gateway.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %request_id(request.headers()),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// `config_updates` carries reloaded configuration files; their routes
    /// replace the table. Returns once `shutdown` fires and connections drain.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let control = if self.config.control.enabled {
            let (client, handle) =
                ControlChannelClient::new(self.config.control.clone(), self.table(), Arc::clone(&self.client_rates));
            tokio::spawn(client.run(shutdown.resubscribe()));
            handle
        } else {
            tracing::info!("Control channel disabled, serving configured routes only");
            ControlHandle::detached()
        };

        tokio::spawn(apply_config_updates(
            self.table(),
            self.config.control.enabled,
            config_updates,
            shutdown.resubscribe(),
        ));
        tokio::spawn(sweep_accounting(
            self.accountant(),
            Arc::clone(&self.client_rates),
            Duration::from_millis(self.config.accounting.window_ms),
            shutdown.resubscribe(),
        ));

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let state = AdminState::new(self.table(), self.accountant(), control, &self.config.admin.api_key);
            let mut admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API starting");
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, setup_admin_router(state))
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API stopped");
                }
            });
        }

        let app = self.build_router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(gateway): State<Gateway>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    match gateway.handle(request, Some(addr)).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Apply `[[routes]]` from each reloaded configuration file.
///
/// With the control channel on, the coordinator owns the table and file
/// routes are only seeds: they are merged in, never allowed to drop pushed
/// domains.
async fn apply_config_updates(
    table: Arc<RoutingTable>,
    control_enabled: bool,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                if control_enabled && config.routes.is_empty() {
                    tracing::debug!("Configuration reloaded without seed routes, table unchanged");
                    continue;
                }
                let applied = if control_enabled {
                    table.merge(&config.routes)
                } else {
                    table.replace_all(&config.routes)
                };
                match applied {
                    Ok(version) => tracing::info!(
                        routes = config.routes.len(),
                        version,
                        merged = control_enabled,
                        "Routes reloaded from configuration file"
                    ),
                    Err(e) => tracing::error!(error = %e, "Reloaded routes rejected, keeping current table"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn sweep_accounting(
    accountant: Arc<dyn ConnectionAccountant>,
    client_rates: Arc<MemoryAccountant>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(100)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = accountant.sweep() + client_rates.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Expired accounting entries swept");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
