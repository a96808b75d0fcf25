//! Rate cache
//!
//! Generic cache-aside primitive over an in-process key-value store
//! with optional TTL. Values are stored as serialized JSON strings;
//! `get` falls back to treating an undecodable payload as a raw string
//! rather than failing.
//!
//! Concurrent misses for the same key are not de-duplicated: two
//! callers may both invoke the factory. This is an accepted trade-off
//! (the factory is an idempotent read with bounded cost).

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// In-memory key-value cache with per-entry TTL.
#[derive(Debug, Clone, Default)]
pub struct RateCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached value. Returns `None` for absent or expired keys.
    ///
    /// On deserialization failure the raw stored string is retried as
    /// the value itself, so a plain-string payload set by `set_raw`
    /// still round-trips through `get::<String>`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = {
            let entries = self.entries.read().await;
            let entry = entries.get(key)?;
            if entry.is_expired() {
                None
            } else {
                Some(entry.payload.clone())
            }
        };

        let payload = match payload {
            Some(p) => p,
            None => {
                // Expired: drop the entry so it does not linger.
                self.entries.write().await.remove(key);
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(_) => serde_json::from_value(serde_json::Value::String(payload)).ok(),
        }
    }

    /// Store a value, serialized as JSON, with an optional TTL.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to serialize cache value, skipping");
                return;
            }
        };
        self.insert(key, payload, ttl).await;
    }

    /// Store a pre-serialized string payload as-is.
    pub async fn set_raw(&self, key: &str, payload: String, ttl: Option<Duration>) {
        self.insert(key, payload, ttl).await;
    }

    /// Remove a key.
    pub async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Cache-aside read: return the cached value on a hit; on a miss,
    /// invoke `factory`, store its result if non-empty, and return it.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(Some(hit));
        }

        let value = factory().await?;
        if let Some(ref v) = value {
            self.set(key, v, ttl).await;
        }
        Ok(value)
    }

    async fn insert(&self, key: &str, payload: String, ttl: Option<Duration>) {
        let entry = CacheEntry {
            payload,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }
}
