//! Storage backends for the response cache
//!
//! A backend only moves strings in and out of a key-value store with expiry.
//! Serialization and error swallowing live one level up in [`CacheManager`].
//!
//! [`CacheManager`]: super::CacheManager

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use super::CacheError;

/// Upper bound on memory entry lifetime (100 years)
const MAX_MEMORY_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// A key-value store with per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the live value for `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for `ttl_secs` seconds, replacing any previous value
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;

    /// Removes `key` if present
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Releases any connection held by the backend
    async fn close(&self);

    /// Short name used in log lines
    fn name(&self) -> &'static str;
}

/// Longest wait for a Redis connection before the call counts as a miss
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest wait for a single Redis command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a failed connect before the next attempt
const RECONNECT_COOLDOWN: Duration = Duration::from_secs(5);

enum ConnectionState {
    Idle,
    Connecting(Instant),
    Connected(ConnectionManager),
    Failed(Instant),
}

/// Redis-backed store
///
/// The connection is opened on first use and shared by every caller afterwards.
/// `ConnectionManager` multiplexes concurrent commands over that one connection
/// and reconnects on its own if the link drops.
///
/// Only one caller connects at a time. Callers arriving while a connect is in
/// flight, or during the cooldown after a failed one, get
/// [`CacheError::Unavailable`] at once instead of waiting.
pub struct RedisBackend {
    client: redis::Client,
    state: Mutex<ConnectionState>,
}

impl RedisBackend {
    /// Creates a backend for the given Redis URL without connecting
    ///
    /// # Returns
    /// * `Err(CacheError::Configuration)` if no URL is supplied
    /// * `Err(CacheError::Redis)` if the URL cannot be parsed
    pub fn new(url: Option<&str>) -> Result<Self, CacheError> {
        let url = url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CacheError::Configuration("CACHE_REDIS_URL is not configured".to_string()))?;

        let client = redis::Client::open(url)?;

        Ok(Self {
            client,
            state: Mutex::new(ConnectionState::Idle),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the shared connection, connecting if this is the first use
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        {
            let mut state = self.lock_state();
            match &*state {
                ConnectionState::Connected(conn) => return Ok(conn.clone()),
                // A connect abandoned by a dropped request is retried once it is stale
                ConnectionState::Connecting(since) if since.elapsed() < CONNECT_TIMEOUT => {
                    return Err(CacheError::Unavailable("connection in progress".to_string()));
                }
                ConnectionState::Failed(at) if at.elapsed() < RECONNECT_COOLDOWN => {
                    return Err(CacheError::Unavailable("recent connection failure".to_string()));
                }
                _ => {}
            }
            *state = ConnectionState::Connecting(Instant::now());
        }

        let connect = ConnectionManager::new(self.client.clone());
        let result = tokio::time::timeout(CONNECT_TIMEOUT, connect).await;

        let mut state = self.lock_state();
        match result {
            Ok(Ok(conn)) => {
                info!("Redis client connected");
                *state = ConnectionState::Connected(conn.clone());
                Ok(conn)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Redis connection failed");
                *state = ConnectionState::Failed(Instant::now());
                Err(e.into())
            }
            Err(_) => {
                warn!(timeout = ?CONNECT_TIMEOUT, "Redis connection timed out");
                *state = ConnectionState::Failed(Instant::now());
                Err(CacheError::Unavailable(format!(
                    "connection timed out after {:?}",
                    CONNECT_TIMEOUT
                )))
            }
        }
    }
}

/// Bounds a Redis command by [`COMMAND_TIMEOUT`]
async fn timed<T>(
    command: impl std::future::Future<Output = redis::RedisResult<T>>,
) -> Result<T, CacheError> {
    match tokio::time::timeout(COMMAND_TIMEOUT, command).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CacheError::Unavailable(format!(
            "command timed out after {:?}",
            COMMAND_TIMEOUT
        ))),
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        timed(conn.get::<_, Option<String>>(key)).await
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        timed(conn.set_ex::<_, _, ()>(key, value, ttl_secs)).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        timed(conn.del::<_, ()>(key)).await
    }

    async fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ConnectionState::Idle);
        if matches!(previous, ConnectionState::Connected(_)) {
            info!("Redis client disconnected");
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Wrapper for a value held by [`MemoryBackend`]
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process store for local runs and tests
///
/// Expired entries are dropped lazily when read.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryEntry>> {
        // A panic while holding the lock cannot leave a half-written entry behind
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if Utc::now() < entry.expires_at => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let ttl_secs = ttl_secs.min(MAX_MEMORY_TTL_SECS) as i64;
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_secs);

        self.lock()
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn close(&self) {
        self.lock().clear();
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
