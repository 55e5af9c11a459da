//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems emit tracing events with structured fields
//!     → logging.rs (EnvFilter + pretty or JSON formatter)
//!     → stdout
//!
//! HTTP requests carry a span with their x-request-id
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - `RUST_LOG` overrides the configured level

pub mod logging;

pub use logging::init;
