//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (Host)
//!     → table.rs (lookup against the current snapshot)
//!     → Return: BackendPool or NotFound
//!
//! Routing update (coordinator message, config reload):
//!     RouteEntry[]
//!     → validation.rs (whole batch, first error rejects it)
//!     → table.rs (build next snapshot, atomic swap)
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; updates publish a new one
//! - Lookups never block on updates
//! - Explicit NotFound rather than a default backend

pub mod pool;
pub mod table;
pub mod validation;

pub use pool::{BackendPool, Endpoint, Strategy};
pub use table::{NotFound, RoutingTable, Snapshot};
pub use validation::{RouteEntry, ValidationError};
