//! Round-robin load balancing strategy.

use async_trait::async_trait;

use crate::accounting::ConnectionAccountant;
use crate::load_balancer::LoadBalancer;
use crate::routing::BackendPool;

/// Round-robin selector.
/// Rotates through the pool using the pool's own cursor.
#[derive(Debug, Default)]
pub struct RoundRobin;

impl RoundRobin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoadBalancer for RoundRobin {
    async fn next_index(&self, pool: &BackendPool, _accountant: &dyn ConnectionAccountant) -> Option<usize> {
        pool.advance_cursor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::MemoryAccountant;
    use crate::load_balancer::Selector;
    use crate::routing::pool::test_pool;
    use crate::routing::Strategy;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn accountant() -> MemoryAccountant {
        MemoryAccountant::in_memory(Duration::from_secs(3600), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_round_robin_alternates() {
        let selector = Selector::new();
        let accountant = accountant();
        let pool = test_pool("a.test", &["http://e1", "http://e2"], Strategy::RoundRobin);

        let mut picks = Vec::new();
        for _ in 0..3 {
            let endpoint = selector.select(&pool, &accountant).await.unwrap();
            picks.push(endpoint.url().host_str().unwrap().to_string());
        }
        assert_eq!(picks, vec!["e1", "e2", "e1"]);
    }

    #[tokio::test]
    async fn test_round_robin_is_balanced() {
        let lb = RoundRobin::new();
        let accountant = accountant();
        let pool = test_pool("a.test", &["http://e1", "http://e2", "http://e3"], Strategy::RoundRobin);

        let mut hits = [0usize; 3];
        for _ in 0..10 {
            hits[lb.next_index(&pool, &accountant).await.unwrap()] += 1;
        }
        // 10 picks over 3 endpoints: floor = 3, ceil = 4.
        assert!(hits.iter().all(|&n| n == 3 || n == 4), "hits: {:?}", hits);
        assert_eq!(hits.iter().sum::<usize>(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_cover_every_endpoint() {
        let selector = Arc::new(Selector::new());
        let accountant = Arc::new(accountant());
        let pool = Arc::new(test_pool(
            "a.test",
            &["http://e1", "http://e2", "http://e3"],
            Strategy::RoundRobin,
        ));

        let tasks: Vec<_> = (0..300)
            .map(|_| {
                let (selector, accountant, pool) = (selector.clone(), accountant.clone(), pool.clone());
                tokio::spawn(async move { selector.select(&pool, accountant.as_ref()).await.unwrap() })
            })
            .collect();

        let mut hits: HashMap<String, usize> = HashMap::new();
        for task in tasks {
            *hits.entry(task.await.unwrap().to_string()).or_default() += 1;
        }
        assert_eq!(hits.len(), 3);
        assert!(hits.values().all(|&n| n == 100), "hits: {:?}", hits);
    }
}
