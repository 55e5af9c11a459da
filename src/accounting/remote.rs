//! Remote window store over HTTP.
//!
//! Talks to a shared counter service so several gateway processes balance on
//! the same counts:
//!
//! ```text
//! POST {base}/counters/{window}/{key}?ttl_ms=N   → {"count": n}
//! GET  {base}/counters/{window}/{key}            → {"count": n}  (404 = 0)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::accounting::{AccountingError, WindowId, WindowStore};

#[derive(Debug, Deserialize)]
struct CountReply {
    count: u64,
}

/// Counter service client.
#[derive(Debug, Clone)]
pub struct HttpWindowStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpWindowStore {
    pub fn new(base: &str) -> Result<Self, AccountingError> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(AccountingError::NotABase(base.to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    /// `{base}/counters/{window}/{key}`, with `key` percent-encoded as one segment.
    pub fn counter_url(&self, key: &str, window: WindowId) -> Result<Url, AccountingError> {
        let mut url = self.base.clone();
        let window = window.to_string();
        url.path_segments_mut()
            .map_err(|_| AccountingError::NotABase(self.base.to_string()))?
            .pop_if_empty()
            .extend(["counters", window.as_str(), key]);
        Ok(url)
    }
}

#[async_trait]
impl WindowStore for HttpWindowStore {
    async fn increment(&self, key: &str, window: WindowId, ttl: Duration) -> Result<u64, AccountingError> {
        let url = self.counter_url(key, window)?;
        let response = self
            .client
            .post(url)
            .query(&[("ttl_ms", ttl.as_millis() as u64)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AccountingError::Status(response.status().as_u16()));
        }
        Ok(response.json::<CountReply>().await?.count)
    }

    async fn count(&self, key: &str, window: WindowId) -> Result<u64, AccountingError> {
        let url = self.counter_url(key, window)?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(0),
            status if status.is_success() => Ok(response.json::<CountReply>().await?.count),
            status => Err(AccountingError::Status(status.as_u16())),
        }
    }
}
