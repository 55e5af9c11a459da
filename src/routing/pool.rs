//! Backend pool for a single domain.
//!
//! # Responsibilities
//! - Hold the ordered endpoint list and the strategy for one domain
//! - Own the round-robin cursor for that domain
//!
//! # Design Decisions
//! - Endpoints are immutable once the pool is published; a changed list
//!   produces a new pool (and therefore a fresh cursor)
//! - The cursor advances with a single compare-and-swap step

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::routing::validation::ValidRoute;

/// Load-balancing strategy of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    LeastConnections,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::LeastConnections => "least-connections",
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "round_robin" | "roundrobin" | "rr" => Ok(Strategy::RoundRobin),
            "least-connections" | "least_connections" | "leastconn" | "least-conn" => {
                Ok(Strategy::LeastConnections)
            }
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend target, identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse a backend base URL. Only plain `http` targets with a host are accepted.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
        if url.scheme() != "http" {
            return Err(format!("unsupported scheme {:?}, expected http", url.scheme()));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err("missing host".to_string());
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err("query and fragment are not allowed".to_string());
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Accounting key for this endpoint.
    pub fn key(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Ordered endpoints of one domain plus the strategy used across them.
#[derive(Debug)]
pub struct BackendPool {
    domain: String,
    endpoints: Vec<Endpoint>,
    strategy: Strategy,
    /// Index of the next endpoint handed out by round-robin.
    cursor: AtomicUsize,
}

impl BackendPool {
    pub(crate) fn from_route(route: ValidRoute) -> Self {
        Self {
            domain: route.domain,
            endpoints: route.endpoints,
            strategy: route.strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Read the cursor and advance it by one (with wraparound) as one atomic step.
    ///
    /// Returns `None` only for an empty pool.
    pub fn advance_cursor(&self) -> Option<usize> {
        let len = self.endpoints.len();
        if len == 0 {
            return None;
        }
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        Some(previous % len)
    }

    /// True when `route` describes exactly this pool's endpoints and strategy.
    pub(crate) fn has_layout(&self, route: &ValidRoute) -> bool {
        self.strategy == route.strategy && self.endpoints == route.endpoints
    }
}

#[cfg(test)]
pub(crate) fn test_pool(domain: &str, endpoints: &[&str], strategy: Strategy) -> BackendPool {
    BackendPool::from_route(ValidRoute {
        domain: domain.to_string(),
        endpoints: endpoints.iter().map(|e| Endpoint::parse(e).unwrap()).collect(),
        strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("round-robin".parse::<Strategy>(), Ok(Strategy::RoundRobin));
        assert_eq!("Least_Connections".parse::<Strategy>(), Ok(Strategy::LeastConnections));
        assert!("random".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_endpoint_rules() {
        assert!(Endpoint::parse("http://10.0.0.1:3000").is_ok());
        assert!(Endpoint::parse("http://backend.internal/base").is_ok());
        assert!(Endpoint::parse("https://backend.internal").is_err());
        assert!(Endpoint::parse("backend.internal").is_err());
        assert!(Endpoint::parse("http://backend.internal/?a=1").is_err());
    }

    #[test]
    fn test_cursor_wraps() {
        let pool = test_pool("a.test", &["http://e1", "http://e2", "http://e3"], Strategy::RoundRobin);
        let picks: Vec<usize> = (0..7).filter_map(|_| pool.advance_cursor()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_cursor_concurrent_rotation_is_exact() {
        let pool = Arc::new(test_pool(
            "a.test",
            &["http://e1", "http://e2", "http://e3", "http://e4"],
            Strategy::RoundRobin,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut hits = [0usize; 4];
                    for _ in 0..1000 {
                        hits[pool.advance_cursor().unwrap()] += 1;
                    }
                    hits
                })
            })
            .collect();

        let mut totals = [0usize; 4];
        for handle in handles {
            for (i, n) in handle.join().unwrap().iter().enumerate() {
                totals[i] += n;
            }
        }

        // 8000 picks over 4 endpoints: every endpoint exactly 2000 times.
        assert_eq!(totals, [2000; 4]);
    }
}
