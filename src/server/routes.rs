//! Route handlers
//!
//! Each Dune-backed handler validates its input, builds a cache key and hands
//! the orchestrator a producer that runs the matching query on a miss.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{error::ApiError, AppState};
use crate::data::{extract_network_tvl, to_dune_chain, ChainSelector, DuneError, Network};

/// Cache key of the all-networks TVL rows
pub const TVL_CACHE_KEY: &str = "tvl_data_all_networks";

pub fn tokens_info_cache_key(chain: ChainSelector) -> String {
    format!("tokens_info_{}", chain.as_str())
}

pub fn vesting_vaults_cache_key(chain: ChainSelector) -> String {
    format!("vesting_vaults_{}", chain.as_str())
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkQuery {
    network: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChainQuery {
    chain: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TvlResponse {
    pub tvl_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct VaultsResponse {
    pub vaults: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub tokens: Vec<Value>,
}

/// Unwraps a query extraction, treating an unparseable query string as empty
fn lenient_query<T: Default>(query: Result<Query<T>, QueryRejection>) -> T {
    match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            debug!(error = %rejection, "Ignoring unparseable query string");
            T::default()
        }
    }
}

fn parse_network(network: Option<&str>) -> Result<Network, ApiError> {
    let network = network
        .filter(|network| !network.is_empty())
        .ok_or_else(|| ApiError::InvalidNetwork {
            message: "Network is required",
            supported: Network::supported(),
        })?;

    Network::parse(network).ok_or_else(|| ApiError::InvalidNetwork {
        message: "Unsupported network",
        supported: Network::supported(),
    })
}

fn parse_chain(chain: Option<&str>) -> Result<ChainSelector, ApiError> {
    let chain = chain
        .filter(|chain| !chain.is_empty())
        .ok_or_else(|| ApiError::InvalidChain {
            message: "Chain is required",
            supported: ChainSelector::supported(),
        })?;

    ChainSelector::parse(chain).ok_or_else(|| ApiError::InvalidChain {
        message: "Unsupported chain",
        supported: ChainSelector::supported(),
    })
}

/// GET /tvl?network=<network>
pub async fn get_tvl(
    State(state): State<AppState>,
    query: Result<Query<NetworkQuery>, QueryRejection>,
) -> Result<Json<TvlResponse>, ApiError> {
    let query: NetworkQuery = lenient_query(query);
    info!(network = ?query.network, "TVL request");
    let network = parse_network(query.network.as_deref())?;

    let dune = state.dune.clone();
    let cancel = state.shutdown.child_token();
    let all_networks: Value = state
        .cache
        .get_or_set(
            TVL_CACHE_KEY,
            || async move {
                let rows = dune.fetch_tvl_all_networks(&cancel).await?;
                Ok::<_, DuneError>(Value::Array(rows))
            },
            state.cache.default_ttl_secs(),
        )
        .await?;

    let tvl_usd = extract_network_tvl(&all_networks, network)?;
    Ok(Json(TvlResponse { tvl_usd }))
}

/// GET /vesting-vaults?chain=<network|all>
pub async fn get_vesting_vaults(
    State(state): State<AppState>,
    query: Result<Query<ChainQuery>, QueryRejection>,
) -> Result<Json<VaultsResponse>, ApiError> {
    let query: ChainQuery = lenient_query(query);
    info!(chain = ?query.chain, "Vesting vaults request");
    let chain = parse_chain(query.chain.as_deref())?;
    let dune_chain = to_dune_chain(chain.as_str())?;

    let dune = state.dune.clone();
    let cancel = state.shutdown.child_token();
    let vaults = state
        .cache
        .get_or_set(
            &vesting_vaults_cache_key(chain),
            || async move { dune.fetch_vesting_vaults(dune_chain, &cancel).await },
            state.cache.default_ttl_secs(),
        )
        .await?;

    Ok(Json(VaultsResponse { vaults }))
}

/// GET /tokens-info?chain=<network|all>
pub async fn get_tokens_info(
    State(state): State<AppState>,
    query: Result<Query<ChainQuery>, QueryRejection>,
) -> Result<Json<TokensResponse>, ApiError> {
    let query: ChainQuery = lenient_query(query);
    info!(chain = ?query.chain, "Token info request");
    let chain = parse_chain(query.chain.as_deref())?;
    let dune_chain = to_dune_chain(chain.as_str())?;

    let dune = state.dune.clone();
    let cancel = state.shutdown.child_token();
    let tokens = state
        .cache
        .get_or_set(
            &tokens_info_cache_key(chain),
            || async move { dune.fetch_token_info(dune_chain, &cancel).await },
            state.cache.default_ttl_secs(),
        )
        .await?;

    Ok(Json(TokensResponse { tokens }))
}

/// GET /coin/:coin_id, forwarded to CoinGecko
pub async fn get_coin(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let coin = state.coingecko.fetch_coin(&coin_id).await?;
    Ok((coin.status, Json(coin.body)))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
