//! Edge gateway library.
//!
//! Routes inbound HTTP requests by domain to a pool of backend endpoints.
//! The routing table is replaced live by a coordinator over a WebSocket
//! control channel; endpoints are chosen round-robin or by fewest
//! connections in the current accounting window.

// Request path
pub mod http;
pub mod load_balancer;
pub mod routing;

// Shared state and control
pub mod accounting;
pub mod control;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
