//! Control channel wire format.
//!
//! Inbound (coordinator → gateway), one JSON document per text frame:
//!
//! ```text
//! {"type": "replace", "routes": [entry, ...]}   whole table
//! {"type": "merge",   "routes": [entry, ...]}   named domains only
//! {"type": "upsert",  "route": entry}           one domain
//! [entry, ...]                                  replace or merge, per batch_mode
//!
//! entry = {"domain": "a.test", "endpoints": ["http://..."], "strategy": "round-robin"}
//! ```
//!
//! Outbound (gateway → coordinator):
//!
//! ```text
//! {"type": "client_rate", "ip": "203.0.113.7", "connections_per_second": 12}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BatchMode;
use crate::routing::{RouteEntry, RoutingTable, ValidationError};

/// A routing update sent by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Replace { routes: Vec<RouteEntry> },
    Merge { routes: Vec<RouteEntry> },
    Upsert { route: RouteEntry },
}

/// A report sent to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Report {
    ClientRate { ip: String, connections_per_second: u64 },
}

/// Why a control message was discarded.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed control message: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rejected routing update: {0}")]
    Invalid(#[from] ValidationError),

    #[error("binary control frame is not valid UTF-8")]
    NotUtf8,
}

/// Outcome of an applied message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub kind: &'static str,
    pub routes: usize,
    pub version: u64,
}

impl ControlMessage {
    /// Parse one frame. A bare array is read according to `batch_mode`.
    pub fn parse(text: &str, batch_mode: BatchMode) -> Result<Self, ControlError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.is_array() {
            let routes: Vec<RouteEntry> = serde_json::from_value(value)?;
            return Ok(match batch_mode {
                BatchMode::Replace => ControlMessage::Replace { routes },
                BatchMode::Merge => ControlMessage::Merge { routes },
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Replace { .. } => "replace",
            ControlMessage::Merge { .. } => "merge",
            ControlMessage::Upsert { .. } => "upsert",
        }
    }

    /// Apply to `table`. Either the whole message lands or nothing does.
    pub fn apply(&self, table: &RoutingTable) -> Result<Applied, ValidationError> {
        let (routes, version) = match self {
            ControlMessage::Replace { routes } => (routes.len(), table.replace_all(routes)?),
            ControlMessage::Merge { routes } => (routes.len(), table.merge(routes)?),
            ControlMessage::Upsert { route } => (1, table.upsert(route)?),
        };
        Ok(Applied {
            kind: self.kind(),
            routes,
            version,
        })
    }
}

/// Parse and apply one text frame.
pub fn apply_text(table: &RoutingTable, text: &str, batch_mode: BatchMode) -> Result<Applied, ControlError> {
    let message = ControlMessage::parse(text, batch_mode)?;
    Ok(message.apply(table)?)
}
