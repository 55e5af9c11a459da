//! Window arithmetic and the store-backed accountant.

use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::accounting::{AccountingError, ConnectionAccountant};

/// Identifier of a fixed accounting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub u64);

impl WindowId {
    /// The window of width `width` containing `time`.
    pub fn at(time: SystemTime, width: Duration) -> Self {
        let millis = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        let width = width.as_millis().max(1);
        Self((millis / width) as u64)
    }

    pub fn previous(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backing store for windowed counters.
#[async_trait]
pub trait WindowStore: Send + Sync + fmt::Debug {
    /// Atomically add one to `key` in `window` and return the new count.
    /// The entry may be dropped once `ttl` has passed without an increment.
    async fn increment(&self, key: &str, window: WindowId, ttl: Duration) -> Result<u64, AccountingError>;

    /// Current count of `key` in `window`.
    async fn count(&self, key: &str, window: WindowId) -> Result<u64, AccountingError>;

    /// Drop expired entries. Stores that expire on their own keep the default.
    fn sweep(&self) -> usize {
        0
    }
}

/// A [`ConnectionAccountant`] over any [`WindowStore`].
#[derive(Debug)]
pub struct WindowedAccountant<S> {
    store: S,
    window: Duration,
    query_timeout: Duration,
}

impl<S: WindowStore> WindowedAccountant<S> {
    pub fn new(store: S, window: Duration, query_timeout: Duration) -> Self {
        Self {
            store,
            window,
            query_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn current_window(&self) -> WindowId {
        WindowId::at(SystemTime::now(), self.window)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AccountingError>>,
    ) -> Result<T, AccountingError> {
        tokio::time::timeout(self.query_timeout, call)
            .await
            .map_err(|_| AccountingError::Timeout(self.query_timeout))?
    }
}

#[async_trait]
impl<S: WindowStore> ConnectionAccountant for WindowedAccountant<S> {
    async fn record_connection(&self, key: &str) -> Result<u64, AccountingError> {
        let window = self.current_window();
        // Keep the entry readable for the whole window plus one more.
        let ttl = self.window * 2;
        self.bounded(self.store.increment(key, window, ttl)).await
    }

    async fn current_count(&self, key: &str) -> Result<u64, AccountingError> {
        let window = self.current_window();
        self.bounded(self.store.count(key, window)).await
    }

    fn sweep(&self) -> usize {
        self.store.sweep()
    }
}
