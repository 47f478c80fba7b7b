//! Shared-secret gate for protected routes

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use super::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct SecretQuery {
    #[serde(rename = "apiSecret")]
    api_secret: Option<String>,
}

/// Rejects the request with 401 unless `?apiSecret=` equals the configured secret
///
/// A query string that cannot be parsed carries no usable secret and is
/// rejected the same way.
pub async fn require_api_secret(
    State(state): State<AppState>,
    query: Result<Query<SecretQuery>, QueryRejection>,
    request: Request,
    next: Next,
) -> Response {
    let provided = query.ok().and_then(|Query(query)| query.api_secret);
    if provided.as_deref() != Some(state.api_secret.as_ref()) {
        warn!(path = %request.uri().path(), "Rejected request with invalid API secret");
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}
