use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::CacheError;
use crate::key::{CacheKey, Collection};

const EVENT_CAPACITY: usize = 64;

/// Client-side query cache backed by moka.
///
/// Values are stored as JSON so any API payload can be cached under a
/// [`CacheKey`]. Mutations call [`QueryCache::invalidate`] with the collections
/// they touch; subscribers receive one event per invalidated collection.
pub struct QueryCache {
    inner: Cache<CacheKey, String>,
    events: broadcast::Sender<Collection>,
    generation: AtomicU64,
}

impl QueryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            events,
            generation: AtomicU64::new(0),
        }
    }

    /// Get a typed value by key.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        match self.inner.get(key).await {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize>(&self, key: CacheKey, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        self.inner.insert(key, json).await;
        Ok(())
    }

    /// Read-through: return the cached value or run `fetch` and cache its result.
    ///
    /// A result fetched while an invalidation happened is returned but not cached.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(&key).await? {
            debug!(key = %key, "Query cache hit");
            return Ok(hit);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let value = fetch().await?;
        if self.generation.load(Ordering::Acquire) == generation {
            self.put(key, &value).await?;
        } else {
            debug!(key = %key, "Skipping cache fill after concurrent invalidation");
        }
        Ok(value)
    }

    /// Drop every cached query of the given collections and notify subscribers.
    pub async fn invalidate(&self, collections: &[Collection]) {
        self.generation.fetch_add(1, Ordering::AcqRel);

        let stale: Vec<CacheKey> = self
            .inner
            .iter()
            .filter(|(key, _)| collections.contains(&key.collection()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &stale {
            self.inner.invalidate(key).await;
        }

        for collection in collections {
            debug!(collection = %collection, dropped = stale.len(), "Invalidated collection");
            // No receivers is fine.
            let _ = self.events.send(*collection);
        }
    }

    /// Receive invalidation events.
    pub fn subscribe(&self) -> broadcast::Receiver<Collection> {
        self.events.subscribe()
    }
}
