//! Cache manager with cache-aside lookups
//!
//! Provides a `CacheManager` that stores serializable data as JSON strings with
//! a TTL and wraps a fallback producer in [`CacheManager::get_or_set`].

use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::{CacheBackend, CacheBackendKind, CacheConfig, CacheError, MemoryBackend, RedisBackend};

/// Typed, failure-tolerant front for a [`CacheBackend`]
///
/// Cheap to clone; clones share the same backend. Construct it once at startup
/// with [`CacheManager::open`] and call [`CacheManager::close`] on shutdown.
#[derive(Clone)]
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    default_ttl_secs: u64,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.backend.name())
            .field("default_ttl_secs", &self.default_ttl_secs)
            .finish()
    }
}

impl CacheManager {
    /// Opens the cache described by `config`
    ///
    /// No connection is made here; the Redis backend connects on first use.
    ///
    /// # Returns
    /// * `Err(CacheError::Configuration)` if the Redis backend is selected without a URL
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        let backend: Arc<dyn CacheBackend> = match config.backend {
            CacheBackendKind::Redis => Arc::new(RedisBackend::new(config.redis_url.as_deref())?),
            CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };

        info!(
            backend = backend.name(),
            ttl_secs = config.ttl_secs,
            "Cache opened"
        );

        Ok(Self::with_backend(backend, config.ttl_secs))
    }

    /// Creates a manager over an existing backend
    pub fn with_backend(backend: Arc<dyn CacheBackend>, default_ttl_secs: u64) -> Self {
        Self {
            backend,
            default_ttl_secs,
        }
    }

    /// Creates a manager over a fresh in-process store
    pub fn in_memory(default_ttl_secs: u64) -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), default_ttl_secs)
    }

    /// TTL configured for this cache, in seconds
    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Reads a value from the cache
    ///
    /// Returns `None` on a miss, on an expired entry, and on any backend or
    /// decoding failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "Cache MISS");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read error");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "Cache HIT");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Cache entry could not be decoded");
                None
            }
        }
    }

    /// Writes a value to the cache with a TTL in seconds
    ///
    /// Best-effort: failures are logged and otherwise ignored.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Cache write error");
                return;
            }
        };

        match self.backend.set(key, raw, ttl_secs).await {
            Ok(()) => debug!(key, ttl_secs, "Cache SET"),
            Err(e) => warn!(key, error = %e, "Cache write error"),
        }
    }

    /// Removes a value from the cache
    pub async fn delete(&self, key: &str) {
        match self.backend.delete(key).await {
            Ok(()) => debug!(key, "Cache DELETED"),
            Err(e) => warn!(key, error = %e, "Cache delete error"),
        }
    }

    /// Returns the cached value for `key`, or computes, stores and returns it
    ///
    /// On a miss `producer` runs exactly once. Its error is returned as-is and
    /// nothing is cached. Concurrent misses on the same key are not coalesced:
    /// each caller runs its own producer and the last write wins.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl_secs: u64,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        let fresh = producer().await?;
        self.set(key, &fresh, ttl_secs).await;
        Ok(fresh)
    }

    /// Releases the backend connection
    pub async fn close(&self) {
        self.backend.close().await;
        info!(backend = self.backend.name(), "Cache closed");
    }
}
