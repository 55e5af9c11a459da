//! The live domain → backend pool table.
//!
//! # Responsibilities
//! - Answer lookups against one consistent snapshot
//! - Apply validated updates (full replace, merge, single upsert)
//! - Publish each update with a single atomic reference swap
//!
//! # Design Decisions
//! - Copy-on-write: readers load an `Arc<Snapshot>` through `ArcSwap` and
//!   never wait for writers
//! - Writers are serialised by a mutex held only while the next snapshot is
//!   built and swapped in; validation happens before the lock is taken
//! - A pool whose endpoints and strategy are unchanged is carried over as the
//!   same `Arc`, so its round-robin cursor survives unrelated updates

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::routing::pool::BackendPool;
use crate::routing::validation::{
    canonical_domain, validate_batch, validate_entry, RouteEntry, ValidRoute, ValidationError,
};

/// Lookup miss: the domain is not in the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no route for domain {0}")]
pub struct NotFound(pub String);

/// An immutable view of the routing table.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    pools: HashMap<String, Arc<BackendPool>>,
}

impl Snapshot {
    /// Number of updates applied before this snapshot was published.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, domain: &str) -> Option<&Arc<BackendPool>> {
        self.pools.get(domain)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// All pools, ordered by domain.
    pub fn pools(&self) -> Vec<Arc<BackendPool>> {
        let mut pools: Vec<_> = self.pools.values().cloned().collect();
        pools.sort_by(|a, b| a.domain().cmp(b.domain()));
        pools
    }
}

/// The authoritative routing table, shared by the gateway and every writer.
#[derive(Debug, Default)]
pub struct RoutingTable {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl RoutingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table seeded with `entries` (e.g. from static configuration).
    pub fn from_routes(entries: &[RouteEntry]) -> Result<Self, ValidationError> {
        let table = Self::new();
        if !entries.is_empty() {
            table.replace_all(entries)?;
        }
        Ok(table)
    }

    /// Find the pool serving `domain`.
    pub fn lookup(&self, domain: &str) -> Result<Arc<BackendPool>, NotFound> {
        let key = canonical_domain(domain);
        self.snapshot
            .load()
            .get(&key)
            .cloned()
            .ok_or(NotFound(key))
    }

    /// The current snapshot, for callers that need several reads to agree.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }

    /// Replace the whole table with `entries`.
    ///
    /// The batch is validated as a unit; on error the table is untouched.
    pub fn replace_all(&self, entries: &[RouteEntry]) -> Result<u64, ValidationError> {
        let routes = validate_batch(entries)?;
        Ok(self.publish(|current| {
            routes
                .into_iter()
                .map(|route| (route.domain.clone(), carry_over(current, route)))
                .collect()
        }))
    }

    /// Insert or replace the pools named in `entries`, keeping every other pool.
    ///
    /// Same all-or-nothing validation as [`RoutingTable::replace_all`].
    pub fn merge(&self, entries: &[RouteEntry]) -> Result<u64, ValidationError> {
        let routes = validate_batch(entries)?;
        Ok(self.publish(|current| {
            let mut pools = current.pools.clone();
            for route in routes {
                pools.insert(route.domain.clone(), carry_over(current, route));
            }
            pools
        }))
    }

    /// Insert or replace a single pool.
    pub fn upsert(&self, entry: &RouteEntry) -> Result<u64, ValidationError> {
        let route = validate_entry(entry)?;
        Ok(self.publish(|current| {
            let mut pools = current.pools.clone();
            pools.insert(route.domain.clone(), carry_over(current, route));
            pools
        }))
    }

    fn publish<F>(&self, build: F) -> u64
    where
        F: FnOnce(&Snapshot) -> HashMap<String, Arc<BackendPool>>,
    {
        // The guarded value is (), so a poisoned lock carries no broken state.
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot.load_full();
        let next = Snapshot {
            version: current.version + 1,
            pools: build(&current),
        };
        let version = next.version;
        self.snapshot.store(Arc::new(next));
        version
    }
}

fn carry_over(current: &Snapshot, route: ValidRoute) -> Arc<BackendPool> {
    match current.get(&route.domain) {
        Some(existing) if existing.has_layout(&route) => Arc::clone(existing),
        _ => Arc::new(BackendPool::from_route(route)),
    }
}
