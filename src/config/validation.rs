//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Seed routes obey the same rules as coordinator updates
//! - Validate value ranges (durations > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ConfigValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{AccountingBackend, ProxyConfig};
use crate::routing::validation::{validate_batch, ValidationError};

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("{field}: {value:?} is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: {value:?} is not a valid URL ({reason})")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("routes: {0}")]
    Routes(#[from] ValidationError),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ConfigValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if let Err(e) = validate_batch(&config.routes) {
        errors.push(e.into());
    }

    for (field, value) in [
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("accounting.window_ms", config.accounting.window_ms),
        ("accounting.query_timeout_ms", config.accounting.query_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ConfigValidationError::Zero(field));
        }
    }

    if config.accounting.backend == AccountingBackend::Http {
        match config.accounting.remote_url.as_deref() {
            None => errors.push(ConfigValidationError::Missing("accounting.remote_url")),
            Some(raw) => check_url(&mut errors, "accounting.remote_url", raw, &["http", "https"]),
        }
    }

    if config.control.enabled {
        check_url(&mut errors, "control.coordinator_url", &config.control.coordinator_url, &["ws"]);
        if config.control.connect_timeout_secs == 0 {
            errors.push(ConfigValidationError::Zero("control.connect_timeout_secs"));
        }
        if config.control.reconnect_max_ms == 0 {
            errors.push(ConfigValidationError::Zero("control.reconnect_max_ms"));
        }
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ConfigValidationError::Missing("admin.api_key"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ConfigValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ConfigValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_url(errors: &mut Vec<ConfigValidationError>, field: &'static str, value: &str, schemes: &[&str]) {
    let reason = match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => return,
        Ok(url) => format!("scheme {:?} not supported", url.scheme()),
        Err(e) => e.to_string(),
    };
    errors.push(ConfigValidationError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    });
}
