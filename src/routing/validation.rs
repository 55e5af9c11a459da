//! Validation of routing updates.
//!
//! # Responsibilities
//! - Normalise domains to their canonical key
//! - Check endpoint lists and strategies
//! - Validate a batch as a unit: the first bad entry rejects the whole batch
//!
//! # Design Decisions
//! - Validation is a pure function of the input; it never touches the table
//! - A missing strategy means round-robin, an unknown one is an error

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::pool::{Endpoint, Strategy};

/// A route as it arrives from the config file or the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteEntry {
    /// Hostname the route answers for.
    pub domain: String,

    /// Backend base URLs, in selection order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,

    /// Single-endpoint shorthand, appended after `endpoints`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// `round-robin` (default) or `least-connections`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl RouteEntry {
    pub fn new<I, S>(domain: impl Into<String>, endpoints: I, strategy: Strategy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domain: domain.into(),
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            backend: None,
            strategy: Some(strategy.as_str().to_string()),
        }
    }
}

/// A route that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRoute {
    pub domain: String,
    pub endpoints: Vec<Endpoint>,
    pub strategy: Strategy,
}

/// Reasons a routing update is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("route entry has an empty domain")]
    EmptyDomain,

    #[error("malformed domain {0:?}")]
    InvalidDomain(String),

    #[error("domain {0} has no endpoints")]
    NoEndpoints(String),

    #[error("domain {domain}: invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        domain: String,
        endpoint: String,
        reason: String,
    },

    #[error("domain {domain}: unknown strategy {strategy:?}")]
    UnknownStrategy { domain: String, strategy: String },

    #[error("domain {0} appears more than once in the batch")]
    DuplicateDomain(String),
}

/// Lower-case a hostname and drop a trailing root dot.
pub fn canonical_domain(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Structural hostname check: dot-separated labels of `[a-z0-9-]`,
/// 1..=63 bytes each, no label starting or ending with a hyphen.
pub fn is_well_formed(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    })
}

/// Validate a single entry.
pub fn validate_entry(entry: &RouteEntry) -> Result<ValidRoute, ValidationError> {
    let domain = canonical_domain(&entry.domain);
    if domain.is_empty() {
        return Err(ValidationError::EmptyDomain);
    }
    if !is_well_formed(&domain) {
        return Err(ValidationError::InvalidDomain(entry.domain.clone()));
    }

    let strategy = match entry.strategy.as_deref() {
        None => Strategy::default(),
        Some(raw) => raw
            .parse::<Strategy>()
            .map_err(|_| ValidationError::UnknownStrategy {
                domain: domain.clone(),
                strategy: raw.to_string(),
            })?,
    };

    let endpoints = entry
        .endpoints
        .iter()
        .chain(entry.backend.iter())
        .map(|raw| {
            Endpoint::parse(raw).map_err(|reason| ValidationError::InvalidEndpoint {
                domain: domain.clone(),
                endpoint: raw.clone(),
                reason,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if endpoints.is_empty() {
        return Err(ValidationError::NoEndpoints(domain));
    }

    Ok(ValidRoute {
        domain,
        endpoints,
        strategy,
    })
}

/// Validate every entry of a batch; the batch is rejected on the first error.
pub fn validate_batch(entries: &[RouteEntry]) -> Result<Vec<ValidRoute>, ValidationError> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .iter()
        .map(|entry| {
            let route = validate_entry(entry)?;
            if !seen.insert(route.domain.clone()) {
                return Err(ValidationError::DuplicateDomain(route.domain));
            }
            Ok(route)
        })
        .collect()
}
