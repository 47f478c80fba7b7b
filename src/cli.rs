//! Command-line and environment configuration for the proxy
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it (a `.env` file is loaded first by the binary). Parsed
//! arguments are turned into a validated [`ServiceConfig`].

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::cache::{CacheBackendKind, CacheConfig};
use crate::data::coingecko::COINGECKO_API_URL;
use crate::data::dune::{
    DEFAULT_MAX_POLL_ATTEMPTS, DUNE_API_URL, TVL_BY_NETWORK_QUERY_ID,
};
use crate::data::{PollSettings, QueryIds};

/// Default cache TTL (1 hour)
const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 3600;

/// Default delay between Dune status requests
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Error types for configuration validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The shared API secret is empty
    #[error("API_SECRET is not defined in environment variables")]
    MissingApiSecret,

    /// Redis backend selected without an address
    #[error("CACHE_REDIS_URL is not configured")]
    MissingRedisUrl,

    /// Polling would never ask Dune for a result
    #[error("DUNE_POLL_MAX_ATTEMPTS must be at least 1")]
    InvalidPollAttempts,
}

/// SecondSwap proxy - cached Dune analytics and CoinGecko lookups
#[derive(Parser, Debug)]
#[command(name = "secondswap-proxy")]
#[command(about = "Caching proxy for SecondSwap TVL, vesting vault, token and coin data")]
#[command(version)]
pub struct Cli {
    /// Port the HTTP server listens on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Secret callers must pass as `apiSecret` on protected routes
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    pub api_secret: String,

    /// Dune API key
    #[arg(long, env = "DUNE_API_KEY", hide_env_values = true)]
    pub dune_api_key: Option<String>,

    /// Dune API base URL
    #[arg(long, env = "DUNE_API_URL", default_value = DUNE_API_URL)]
    pub dune_api_url: String,

    /// Dune query id for platform TVL by network
    #[arg(long, env = "DUNE_QUERY_TVL_BY_NETWORK", default_value_t = TVL_BY_NETWORK_QUERY_ID)]
    pub dune_query_tvl_by_network: u64,

    /// Dune query id for vesting vaults
    #[arg(long, env = "DUNE_QUERY_VESTING_VAULTS")]
    pub dune_query_vesting_vaults: Option<u64>,

    /// Dune query id for token info
    #[arg(long, env = "DUNE_QUERY_TOKEN_INFO")]
    pub dune_query_token_info: Option<u64>,

    /// Milliseconds between Dune status requests
    #[arg(long, env = "DUNE_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub dune_poll_interval_ms: u64,

    /// Status requests made before a Dune query times out
    #[arg(long, env = "DUNE_POLL_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_POLL_ATTEMPTS)]
    pub dune_poll_max_attempts: u32,

    /// CoinGecko API base URL
    #[arg(long, env = "COINGECKO_API_URL", default_value = COINGECKO_API_URL)]
    pub coingecko_api_url: String,

    /// Seconds a cached provider response stays valid
    #[arg(long, env = "CACHE_EXPIRATION_SECS", default_value_t = DEFAULT_CACHE_EXPIRATION_SECS)]
    pub cache_expiration_secs: u64,

    /// Store backing the response cache
    #[arg(long, env = "CACHE_BACKEND", value_enum, default_value_t = CacheBackendKind::Redis)]
    pub cache_backend: CacheBackendKind,

    /// Redis URL, required with the redis backend
    #[arg(long, env = "CACHE_REDIS_URL", hide_env_values = true)]
    pub cache_redis_url: Option<String>,
}

/// Dune client settings
#[derive(Debug, Clone)]
pub struct DuneSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub query_ids: QueryIds,
    pub poll: PollSettings,
}

/// Validated settings for the whole service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub api_secret: String,
    pub dune: DuneSettings,
    pub coingecko_api_url: String,
    pub cache: CacheConfig,
}

/// Trims a setting and drops it if nothing is left
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl ServiceConfig {
    /// Creates a ServiceConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(ServiceConfig)` with normalized settings
    /// * `Err(ConfigError)` if a required setting is missing or unusable
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.api_secret.is_empty() {
            return Err(ConfigError::MissingApiSecret);
        }

        if cli.dune_poll_max_attempts == 0 {
            return Err(ConfigError::InvalidPollAttempts);
        }

        let redis_url = non_empty(cli.cache_redis_url.as_deref());
        if cli.cache_backend == CacheBackendKind::Redis && redis_url.is_none() {
            return Err(ConfigError::MissingRedisUrl);
        }

        // Zero is how an unset id shows up in some deployment templates
        let query_id = |id: Option<u64>| id.filter(|id| *id != 0);

        Ok(ServiceConfig {
            port: cli.port,
            api_secret: cli.api_secret.clone(),
            dune: DuneSettings {
                api_key: non_empty(cli.dune_api_key.as_deref()),
                base_url: cli.dune_api_url.clone(),
                query_ids: QueryIds {
                    tvl_by_network: query_id(Some(cli.dune_query_tvl_by_network)),
                    vesting_vaults: query_id(cli.dune_query_vesting_vaults),
                    token_info: query_id(cli.dune_query_token_info),
                },
                poll: PollSettings {
                    interval: Duration::from_millis(cli.dune_poll_interval_ms),
                    max_attempts: cli.dune_poll_max_attempts,
                },
            },
            coingecko_api_url: cli.coingecko_api_url.clone(),
            cache: CacheConfig {
                backend: cli.cache_backend,
                redis_url,
                ttl_secs: cli.cache_expiration_secs,
            },
        })
    }
}
