//! HTTP surface of the proxy
//!
//! Builds the axum router over shared [`AppState`] and runs it until the
//! process receives Ctrl-C or SIGTERM.

pub mod auth;
pub mod error;
pub mod routes;

pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::cli::ServiceConfig;
use crate::data::{CoinGeckoClient, DuneClient};

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub cache: CacheManager,
    pub dune: DuneClient,
    pub coingecko: CoinGeckoClient,
    pub api_secret: Arc<str>,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds the provider clients described by `config`
    pub fn from_config(
        config: &ServiceConfig,
        cache: CacheManager,
        shutdown: CancellationToken,
    ) -> Self {
        let dune = DuneClient::new(config.dune.api_key.clone(), config.dune.query_ids.clone())
            .with_base_url(config.dune.base_url.clone())
            .with_poll_settings(config.dune.poll);

        Self {
            cache,
            dune,
            coingecko: CoinGeckoClient::with_base_url(config.coingecko_api_url.clone()),
            api_secret: Arc::from(config.api_secret.as_str()),
            shutdown,
        }
    }
}

/// Creates the application router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/coin/:coin_id", get(routes::get_coin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_secret,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .route("/tvl", get(routes::get_tvl))
        .route("/vesting-vaults", get(routes::get_vesting_vaults))
        .route("/tokens-info", get(routes::get_tokens_info))
        .merge(protected)
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the proxy until a shutdown signal arrives
///
/// On shutdown the root cancellation token is cancelled so in-flight Dune
/// polls stop, then the cache connection is closed.
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let cache = CacheManager::open(&config.cache)?;
    let shutdown = CancellationToken::new();
    let app = create_router(AppState::from_config(&config, cache.clone(), shutdown.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    cache.close().await;
    info!("Server stopped");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM, then cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    token.cancel();
}
