//! Connection accounting subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway dispatches to an endpoint
//!     → ConnectionAccountant::record_connection(endpoint)
//!     → window.rs (current window id, bounded store call)
//!     → memory.rs (DashMap) | remote.rs (HTTP counter service)
//!
//! Least-connections selection
//!     → ConnectionAccountant::current_count(endpoint) for every endpoint
//! ```
//!
//! # Design Decisions
//! - Fixed windows keyed by `unix_millis / window_ms`, so gateways sharing a
//!   remote store agree on window boundaries
//! - Counts only ever go up inside a window; nothing is decremented when a
//!   request finishes or is cancelled
//! - Every store call has a deadline; a late answer is an error, not a stall

pub mod memory;
pub mod remote;
pub mod window;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AccountingBackend, AccountingConfig};

pub use memory::{MemoryAccountant, MemoryWindowStore};
pub use remote::HttpWindowStore;
pub use window::{WindowId, WindowStore, WindowedAccountant};

/// Errors from the accounting backing store.
#[derive(Debug, Error)]
pub enum AccountingError {
    #[error("accounting store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("accounting store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("accounting store returned status {0}")]
    Status(u16),

    #[error("invalid accounting store url: {0}")]
    Url(#[from] url::ParseError),

    #[error("accounting store url {0} cannot carry a path")]
    NotABase(String),
}

/// Windowed per-key connection counts.
#[async_trait]
pub trait ConnectionAccountant: Send + Sync + fmt::Debug {
    /// Count one connection for `key` in the current window.
    /// Returns the count after the increment.
    async fn record_connection(&self, key: &str) -> Result<u64, AccountingError>;

    /// Connections recorded for `key` in the current window, zero if none.
    async fn current_count(&self, key: &str) -> Result<u64, AccountingError>;

    /// Drop expired entries. Returns how many were removed.
    fn sweep(&self) -> usize {
        0
    }
}

/// Build the accountant selected by configuration.
pub fn from_config(config: &AccountingConfig) -> Result<Arc<dyn ConnectionAccountant>, AccountingError> {
    let window = Duration::from_millis(config.window_ms);
    let query_timeout = Duration::from_millis(config.query_timeout_ms);

    let accountant: Arc<dyn ConnectionAccountant> = match config.backend {
        AccountingBackend::Memory => Arc::new(MemoryAccountant::in_memory(window, query_timeout)),
        AccountingBackend::Http => {
            let base = config.remote_url.as_deref().unwrap_or_default();
            let store = HttpWindowStore::new(base)?;
            Arc::new(WindowedAccountant::new(store, window, query_timeout))
        }
    };

    tracing::info!(
        backend = ?config.backend,
        window_ms = config.window_ms,
        query_timeout_ms = config.query_timeout_ms,
        "Connection accountant ready"
    );
    Ok(accountant)
}
