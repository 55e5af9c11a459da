//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::RouteEntry;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Static seed routes, applied at startup and on file reload.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Connection accounting used by least-connections.
    pub accounting: AccountingConfig,

    /// Coordinator control channel.
    pub control: ControlConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// A seed route has the same shape as a coordinator route entry.
pub type RouteConfig = RouteEntry;

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time allowed for a backend to start answering, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 15,
        }
    }
}

/// Where connection counts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountingBackend {
    /// In this process.
    #[default]
    Memory,
    /// Shared HTTP counter service at `remote_url`.
    Http,
}

/// Connection accounting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountingConfig {
    pub backend: AccountingBackend,

    /// Width of one counting window in milliseconds.
    pub window_ms: u64,

    /// Deadline for a single store call in milliseconds.
    pub query_timeout_ms: u64,

    /// Base URL of the counter service (`backend = "http"` only).
    pub remote_url: Option<String>,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            backend: AccountingBackend::Memory,
            window_ms: 1000,
            query_timeout_ms: 250,
            remote_url: None,
        }
    }
}

/// How a bare array of routes from the coordinator is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// The array is the complete table.
    #[default]
    Replace,
    /// The array updates the named domains only.
    Merge,
}

/// Coordinator control channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Connect to the coordinator.
    pub enabled: bool,

    /// WebSocket URL of the coordinator.
    pub coordinator_url: String,

    /// Interpretation of bare route arrays.
    pub batch_mode: BatchMode,

    /// Base delay for reconnect backoff in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    pub reconnect_max_ms: u64,

    /// Handshake timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Send per-client connection rates to the coordinator.
    pub report_client_rates: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            coordinator_url: "ws://127.0.0.1:3000/control".to_string(),
            batch_mode: BatchMode::Replace,
            reconnect_base_ms: 250,
            reconnect_max_ms: 10_000,
            connect_timeout_secs: 5,
            report_client_rates: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
