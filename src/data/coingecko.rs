//! CoinGecko API client
//!
//! The proxy forwards coin lookups unchanged; this client only builds the URL
//! and decodes the JSON body.

use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

/// Base URL for the CoinGecko API
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Errors that can occur when fetching coin data
#[derive(Debug, Error)]
pub enum CoinGeckoError {
    /// HTTP request failed or the body was not JSON
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Base URL and coin id do not form a valid URL
    #[error("Invalid CoinGecko URL: {0}")]
    InvalidUrl(String),
}

/// Upstream answer for a coin lookup
#[derive(Debug, Clone)]
pub struct CoinResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Client for fetching coin data from CoinGecko
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
}

impl CoinGeckoClient {
    /// Create a new CoinGeckoClient against `base_url`
    ///
    /// Production passes [`COINGECKO_API_URL`] unless configured otherwise.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds `{base}/coins/{coin_id}` with the id percent-encoded as one segment
    fn coin_url(&self, coin_id: &str) -> Result<Url, CoinGeckoError> {
        let mut url = Url::parse(&format!("{}/coins", self.base_url))
            .map_err(|e| CoinGeckoError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CoinGeckoError::InvalidUrl(self.base_url.clone()))?
            .push(coin_id);
        Ok(url)
    }

    /// Fetch the full coin document for a CoinGecko id
    ///
    /// # Returns
    /// * `Ok(CoinResponse)` - Upstream status and JSON body, whatever the status
    /// * `Err(CoinGeckoError)` - If the request fails or the body is not JSON
    pub async fn fetch_coin(&self, coin_id: &str) -> Result<CoinResponse, CoinGeckoError> {
        let url = self.coin_url(coin_id)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.json::<Value>().await?;

        Ok(CoinResponse { status, body })
    }
}
