//! SecondSwap Proxy - cached TVL, vesting vault, token and coin lookups
//!
//! Serves Dune analytics query results and CoinGecko coin data over HTTP,
//! keeping provider responses in a shared cache.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secondswap_proxy::cli::{Cli, ServiceConfig};
use secondswap_proxy::server;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secondswap_proxy=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::from_cli(&cli)?;

    info!(
        port = config.port,
        cache = ?config.cache.backend,
        ttl_secs = config.cache.ttl_secs,
        "Starting SecondSwap proxy"
    );

    server::run(config).await
}
