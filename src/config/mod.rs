//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, seed routes included)
//!     → ProxyConfig (validated, immutable)
//!     → seed routes published into the RoutingTable
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server replaces the routing table with the new seed routes
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only seed routes are hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccountingBackend, AccountingConfig, AdminConfig, BatchMode, ControlConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, ProxyConfig, RouteConfig, TimeoutConfig,
};
pub use watcher::ConfigWatcher;
