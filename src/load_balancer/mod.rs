//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Pool looked up for the request's domain
//!     → Selector dispatches on the pool's strategy:
//!         - round_robin.rs (advance the pool's cursor)
//!         - least_conn.rs (fewest connections in the current window)
//!     → Return the chosen endpoint or SelectionError
//! ```
//!
//! # Design Decisions
//! - Balancers are stateless; the pool owns the cursor and the accountant
//!   owns the counts
//! - An endpoint whose count cannot be read is never preferred
//! - Empty pools are a broken invariant, reported as SelectionError

pub mod least_conn;
pub mod round_robin;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::accounting::ConnectionAccountant;
use crate::load_balancer::{least_conn::LeastConnections, round_robin::RoundRobin};
use crate::routing::{BackendPool, Endpoint, Strategy};

/// A backend choice algorithm.
#[async_trait]
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Index into `pool.endpoints()` of the next endpoint, `None` for an empty pool.
    async fn next_index(&self, pool: &BackendPool, accountant: &dyn ConnectionAccountant) -> Option<usize>;
}

/// No endpoint could be chosen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("backend pool for {0} has no endpoints")]
    EmptyPool(String),
}

/// Picks an endpoint from a pool according to the pool's strategy.
#[derive(Debug, Default)]
pub struct Selector {
    round_robin: RoundRobin,
    least_conn: LeastConnections,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn select(
        &self,
        pool: &BackendPool,
        accountant: &dyn ConnectionAccountant,
    ) -> Result<Endpoint, SelectionError> {
        let balancer: &dyn LoadBalancer = match pool.strategy() {
            Strategy::RoundRobin => &self.round_robin,
            Strategy::LeastConnections => &self.least_conn,
        };

        balancer
            .next_index(pool, accountant)
            .await
            .and_then(|index| pool.endpoints().get(index).cloned())
            .ok_or_else(|| SelectionError::EmptyPool(pool.domain().to_string()))
    }
}
