//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscribed task stops
//!         → listener stops accepting, in-flight requests drain
//!         → control channel sends Close
//!         → reload and sweep tasks exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; each long-running task holds its own receiver
//! - A second signal while draining exits immediately

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
