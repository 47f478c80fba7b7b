//! Error type returned by route handlers

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::data::{CoinGeckoError, DuneError, ExtractError, UnknownChainError};

/// Failure of a request, rendered as `{"error": message}`
#[derive(Debug, Error)]
pub enum ApiError {
    /// `network` query parameter missing or unsupported
    #[error("{message}")]
    InvalidNetwork {
        message: &'static str,
        supported: Vec<&'static str>,
    },

    /// `chain` query parameter missing or unsupported
    #[error("{message}")]
    InvalidChain {
        message: &'static str,
        supported: Vec<&'static str>,
    },

    /// `apiSecret` does not match the configured secret
    #[error("Invalid API secret")]
    Unauthorized,

    /// Upstream, extraction or configuration failure
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ApiError::InvalidNetwork { supported, .. } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message, "supportedNetworks": supported })),
            )
                .into_response(),
            ApiError::InvalidChain { supported, .. } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message, "supportedChains": supported })),
            )
                .into_response(),
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(_) => {
                error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}

impl From<DuneError> for ApiError {
    fn from(err: DuneError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<UnknownChainError> for ApiError {
    fn from(err: UnknownChainError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<CoinGeckoError> for ApiError {
    fn from(err: CoinGeckoError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
