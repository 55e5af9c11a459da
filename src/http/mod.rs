//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → gateway.rs (domain → pool → endpoint, dispatch counted)
//!         → request.rs (target domain from Host / URI authority)
//!     → forward.rs (URI and header rewrite, upstream call)
//!     → Send to client
//! ```

pub mod forward;
pub mod gateway;
pub mod request;
pub mod server;

pub use forward::{Forwarder, HyperForwarder, TransportError};
pub use gateway::{Gateway, GatewayError};
pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
