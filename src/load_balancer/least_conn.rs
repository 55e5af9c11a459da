//! Least Connections load balancing strategy.

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::accounting::ConnectionAccountant;
use crate::load_balancer::LoadBalancer;
use crate::routing::BackendPool;

/// Least connections selector.
/// Selects the endpoint with the fewest connections in the current window.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoadBalancer for LeastConnections {
    async fn next_index(&self, pool: &BackendPool, accountant: &dyn ConnectionAccountant) -> Option<usize> {
        let endpoints = pool.endpoints();
        let counts = join_all(endpoints.iter().map(|e| accountant.current_count(e.key()))).await;

        // Unknown counts rank last. Ties go to the earliest endpoint.
        counts
            .into_iter()
            .enumerate()
            .map(|(index, count)| match count {
                Ok(count) => (count, index),
                Err(e) => {
                    tracing::warn!(
                        domain = %pool.domain(),
                        endpoint = %endpoints[index],
                        error = %e,
                        "Connection count unavailable, deprioritising endpoint"
                    );
                    (u64::MAX, index)
                }
            })
            .min()
            .map(|(_, index)| index)
    }
}
