//! Cache module for storing provider responses
//!
//! This module provides a cache manager that stores JSON-serialized responses
//! in Redis (or an in-process map) with a TTL. Cache failures never surface to
//! callers: a broken read is a miss and a broken write is dropped.

mod backend;
mod manager;

pub use backend::{CacheBackend, MemoryBackend, RedisBackend};
pub use manager::CacheManager;

use thiserror::Error;

/// Errors raised by cache backends
///
/// Only [`CacheManager::open`] returns these to callers; every other cache
/// operation logs them and degrades.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Required cache setting is missing
    #[error("Cache configuration error: {0}")]
    Configuration(String),

    /// Redis command or connection failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend is connecting, cooling down after a failure, or too slow
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Which store backs the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CacheBackendKind {
    /// Shared Redis instance at `CACHE_REDIS_URL`
    #[default]
    Redis,
    /// Process-local map, lost on restart
    Memory,
}

/// Settings needed to open a [`CacheManager`]
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub redis_url: Option<String>,
    /// TTL applied when callers do not pass their own
    pub ttl_secs: u64,
}
