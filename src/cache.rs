use std::{future::Future, sync::Arc, time::Duration};

use log::{debug, warn};
use moka::{future::Cache, Expiry};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsValue;
use tokio::task::JoinHandle;

use crate::error::Error;

#[derive(Clone)]
struct Stored {
    value: Arc<JsValue>,
    ttl: Duration,
}

/// Every entry carries its own time to live.
struct PerEntryTtl;

impl Expiry<String, Stored> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory JSON cache shared by the fetcher, the warmer and the endpoints.
///
/// Expired entries are never returned. A background task sweeps them out
/// periodically so memory stays bounded without reads; it stops on
/// [`TtlCache::close`] or when the cache is dropped.
pub struct TtlCache {
    inner: Cache<String, Stored>,
    sweeper: JoinHandle<()>,
}

impl TtlCache {
    /// Must be called from within a tokio runtime.
    pub fn new(capacity: u64, sweep_every: Duration) -> TtlCache {
        let inner: Cache<String, Stored> = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .support_invalidation_closures()
            .build();
        let sweeper = tokio::spawn(sweep(inner.clone(), sweep_every));
        TtlCache { inner, sweeper }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let stored = self.inner.get(key).await?;
        match T::deserialize(&*stored.value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("cache entry {} has unexpected shape: {}", key, err);
                None
            }
        }
    }

    pub async fn get_json(&self, key: &str) -> Option<Arc<JsValue>> {
        self.inner.get(key).await.map(|stored| stored.value)
    }

    pub async fn set<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                let stored = Stored {
                    value: Arc::new(value),
                    ttl,
                };
                self.inner.insert(key, stored).await
            }
            Err(err) => warn!("not caching {}: {}", key, err),
        }
    }

    /// Returns the cached value, or runs `fetch` and caches its result.
    ///
    /// Concurrent callers for the same missing key wait on a single fetch.
    /// Failures are not cached; every waiter receives the same error.
    pub async fn get_or_fetch<T, F>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T, Arc<Error>>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, Error>>,
    {
        let stored = self
            .inner
            .try_get_with(key.to_owned(), async move {
                let value = serde_json::to_value(fetch.await?)?;
                Ok::<_, Error>(Stored {
                    value: Arc::new(value),
                    ttl,
                })
            })
            .await?;
        T::deserialize(&*stored.value).map_err(|err| Arc::new(Error::from(err)))
    }

    pub async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn delete_by_prefix(&self, prefix: &str) {
        let prefix = prefix.to_owned();
        if let Err(err) = self
            .inner
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            warn!("prefix invalidation failed: {}", err);
        }
    }

    pub fn clear(&self) {
        self.inner.invalidate_all()
    }

    /// Approximate number of live entries.
    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the background sweep. Entries stay readable until dropped.
    pub fn close(&self) {
        self.sweeper.abort()
    }
}

impl Drop for TtlCache {
    fn drop(&mut self) {
        self.sweeper.abort()
    }
}

async fn sweep(inner: Cache<String, Stored>, every: Duration) {
    let mut tick = tokio::time::interval(every);
    tick.tick().await;
    loop {
        tick.tick().await;
        inner.run_pending_tasks().await;
        debug!("cache sweep done, {} entries", inner.entry_count());
    }
}
