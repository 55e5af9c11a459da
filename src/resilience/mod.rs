//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Control channel lost:
//!     → backoff.rs (next delay, jittered)
//!     → reconnect attempt
//!     → on success: reset schedule
//! ```
//!
//! # Design Decisions
//! - Jittered backoff prevents a fleet of gateways reconnecting in lockstep
//! - Requests are never retried against another endpoint inside the gateway

pub mod backoff;

pub use backoff::Backoff;
