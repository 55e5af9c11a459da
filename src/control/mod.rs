//! Coordinator control channel.
//!
//! # Data Flow
//! ```text
//! Coordinator ──WebSocket──→ client.rs (one task, owns the transport)
//!     → message.rs (parse, validate shape)
//!     → RoutingTable::{replace_all, merge, upsert}
//!
//! client.rs ──client_rate reports──→ Coordinator
//! ```
//!
//! # Design Decisions
//! - One task owns the socket, so updates apply strictly in receipt order
//! - A malformed message is dropped on its own; the session stays up
//! - Losing the coordinator never empties the table

pub mod client;
pub mod message;

pub use client::{ConnectionState, ControlChannelClient, ControlHandle};
pub use message::{apply_text, Applied, ControlError, ControlMessage, Report};
