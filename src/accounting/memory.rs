//! In-process window store.
//!
//! One `DashMap` slot per key holding the count of the newest window seen,
//! plus the count of the window it replaced so a completed window stays
//! readable after traffic moves on. Increments run under the slot's shard
//! lock, so concurrent increments of one key are never lost.

use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::accounting::{AccountingError, WindowId, WindowStore, WindowedAccountant};

#[derive(Debug, Clone, Copy)]
struct Slot {
    window: WindowId,
    count: u64,
    /// Count of the window `window` replaced.
    previous: Option<(WindowId, u64)>,
    expires_at: Instant,
}

impl Slot {
    fn count_in(&self, window: WindowId) -> u64 {
        if self.window == window {
            return self.count;
        }
        match self.previous {
            Some((previous, count)) if previous == window => count,
            _ => 0,
        }
    }
}

/// Window counters kept in this process.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    slots: DashMap<String, Slot>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `key` in `window`. Moving to a newer window keeps the
    /// replaced window's count as `previous`; anything older is discarded.
    pub fn increment_now(&self, key: &str, window: WindowId, ttl: Duration) -> u64 {
        let expires_at = Instant::now() + ttl;
        let mut slot = self.slots.entry(key.to_owned()).or_insert(Slot {
            window,
            count: 0,
            previous: None,
            expires_at,
        });
        if slot.window < window {
            slot.previous = Some((slot.window, slot.count));
            slot.window = window;
            slot.count = 0;
        }
        slot.count += 1;
        slot.expires_at = expires_at;
        slot.count
    }

    /// Count of `key` in `window`. A slot more than one window behind is
    /// pruned on the way out; one exactly behind still holds a completed
    /// window that may not have been reported yet.
    pub fn count_now(&self, key: &str, window: WindowId) -> u64 {
        let stale = match self.slots.get(key) {
            Some(slot) if slot.window >= window => return slot.count_in(window),
            Some(slot) => slot.window < window.previous(),
            None => return 0,
        };
        if stale {
            self.slots.remove_if(key, |_, slot| slot.window < window.previous());
        }
        0
    }

    /// Every key with a non-zero count in `window`, whether `window` is a
    /// slot's current or replaced window.
    pub fn counts_in(&self, window: WindowId) -> Vec<(String, u64)> {
        let mut counts: Vec<_> = self
            .slots
            .iter()
            .filter_map(|entry| {
                let count = entry.count_in(window);
                (count > 0).then(|| (entry.key().clone(), count))
            })
            .collect();
        counts.sort();
        counts
    }

    /// Remove slots whose expiry has passed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn increment(&self, key: &str, window: WindowId, ttl: Duration) -> Result<u64, AccountingError> {
        Ok(self.increment_now(key, window, ttl))
    }

    async fn count(&self, key: &str, window: WindowId) -> Result<u64, AccountingError> {
        Ok(self.count_now(key, window))
    }

    fn sweep(&self) -> usize {
        self.prune()
    }
}

/// The default accountant: windowed counts held in this process.
pub type MemoryAccountant = WindowedAccountant<MemoryWindowStore>;

impl WindowedAccountant<MemoryWindowStore> {
    pub fn in_memory(window: Duration, query_timeout: Duration) -> Self {
        Self::new(MemoryWindowStore::new(), window, query_timeout)
    }

    /// Counts of the last window that has fully elapsed, with its id.
    pub fn completed_window_counts(&self) -> (WindowId, Vec<(String, u64)>) {
        let window = WindowId::at(SystemTime::now(), self.window()).previous();
        (window, self.store().counts_in(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::ConnectionAccountant;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_window_rollover_resets_count() {
        let store = MemoryWindowStore::new();
        assert_eq!(store.increment_now("k", WindowId(1), HOUR), 1);
        assert_eq!(store.increment_now("k", WindowId(1), HOUR), 2);
        assert_eq!(store.count_now("k", WindowId(1)), 2);

        assert_eq!(store.count_now("k", WindowId(2)), 0);
        // One window behind: kept for reporting.
        assert_eq!(store.len(), 1);
        assert_eq!(store.count_now("k", WindowId(3)), 0);
        // Two behind: pruned by the read.
        assert!(store.is_empty());

        assert_eq!(store.increment_now("k", WindowId(3), HOUR), 1);
    }

    #[test]
    fn test_completed_window_survives_next_window_increment() {
        let store = MemoryWindowStore::new();
        for _ in 0..3 {
            store.increment_now("203.0.113.7", WindowId(1), HOUR);
        }
        assert_eq!(store.increment_now("203.0.113.7", WindowId(2), HOUR), 1);

        assert_eq!(store.counts_in(WindowId(1)), vec![("203.0.113.7".to_string(), 3)]);
        assert_eq!(store.counts_in(WindowId(2)), vec![("203.0.113.7".to_string(), 1)]);
        assert_eq!(store.count_now("203.0.113.7", WindowId(1)), 3);
        assert_eq!(store.count_now("203.0.113.7", WindowId(2)), 1);

        // Only one replaced window is kept.
        store.increment_now("203.0.113.7", WindowId(3), HOUR);
        assert!(store.counts_in(WindowId(1)).is_empty());
        assert_eq!(store.counts_in(WindowId(2)), vec![("203.0.113.7".to_string(), 1)]);
    }

    #[test]
    fn test_skipped_window_is_not_reported_as_previous() {
        let store = MemoryWindowStore::new();
        store.increment_now("k", WindowId(1), HOUR);
        store.increment_now("k", WindowId(5), HOUR);
        assert!(store.counts_in(WindowId(4)).is_empty());
        assert_eq!(store.counts_in(WindowId(1)), vec![("k".to_string(), 1)]);
    }

    #[test]
    fn test_late_increment_does_not_reset_newer_window() {
        let store = MemoryWindowStore::new();
        store.increment_now("k", WindowId(5), HOUR);
        store.increment_now("k", WindowId(4), HOUR);
        assert_eq!(store.count_now("k", WindowId(5)), 2);
    }

    #[test]
    fn test_prune_drops_expired() {
        let store = MemoryWindowStore::new();
        store.increment_now("old", WindowId(1), Duration::ZERO);
        store.increment_now("fresh", WindowId(1), HOUR);
        assert_eq!(store.prune(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_counts_in_window() {
        let store = MemoryWindowStore::new();
        store.increment_now("10.0.0.2", WindowId(3), HOUR);
        store.increment_now("10.0.0.1", WindowId(3), HOUR);
        store.increment_now("10.0.0.1", WindowId(3), HOUR);
        store.increment_now("10.0.0.3", WindowId(4), HOUR);
        assert_eq!(
            store.counts_in(WindowId(3)),
            vec![("10.0.0.1".to_string(), 2), ("10.0.0.2".to_string(), 1)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_are_not_lost() {
        let accountant = Arc::new(MemoryAccountant::in_memory(HOUR, Duration::from_secs(1)));

        let tasks: Vec<_> = (0..500)
            .map(|_| {
                let accountant = Arc::clone(&accountant);
                tokio::spawn(async move { accountant.record_connection("http://e1/").await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(accountant.current_count("http://e1/").await.unwrap(), 500);
        assert_eq!(accountant.current_count("http://e2/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts_expire_with_window() {
        let accountant = MemoryAccountant::in_memory(Duration::from_millis(50), Duration::from_secs(1));
        accountant.record_connection("k").await.unwrap();
        accountant.record_connection("k").await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(accountant.current_count("k").await.unwrap(), 0);
        assert_eq!(accountant.record_connection("k").await.unwrap(), 1);
    }
}
