//! Dune analytics API client
//!
//! Dune runs saved queries asynchronously: `submit` starts an execution and
//! returns its id, `poll` asks for the execution's status at a fixed interval
//! until it finishes, fails, or runs out of attempts. Nothing is retried after
//! a terminal state; callers re-run the whole query instead.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Base URL for the Dune API
pub const DUNE_API_URL: &str = "https://api.dune.com/api/v1";

/// Header carrying the Dune API key
const API_KEY_HEADER: &str = "X-DUNE-API-KEY";

/// Saved query returning platform TVL for every network
pub const TVL_BY_NETWORK_QUERY_ID: u64 = 6182048;

/// Delay between two status requests
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Status requests made before giving up (~2 minutes at the default interval)
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Query parameter carrying the Dune chain name
const SELECTED_CHAIN_PARAM: &str = "selected_chain";

/// Runtime parameters passed to a saved query
pub type QueryParameters = BTreeMap<String, String>;

/// Errors that can occur when running a Dune query
#[derive(Debug, Error)]
pub enum DuneError {
    /// API key or query id missing from configuration
    #[error("{0}")]
    Configuration(String),

    /// HTTP request failed or the body was not the expected JSON
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Dune answered with a non-success status
    #[error("Dune {stage} error: {status} {reason}")]
    Status {
        stage: &'static str,
        status: u16,
        reason: String,
    },

    /// Dune reported that the execution itself failed
    #[error("Dune query error: {0}")]
    Execution(String),

    /// Execution was still running after the last allowed status request
    #[error("Dune query timeout: exceeded maximum polling attempts ({0})")]
    Timeout(u32),

    /// Caller stopped waiting for the execution
    #[error("Dune query cancelled")]
    Cancelled,
}

/// Saved queries the proxy knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTemplate {
    /// Platform TVL, one row per network
    TvlByNetwork,
    /// Vesting vaults for one chain or all of them
    VestingVaults,
    /// Listed token info for one chain or all of them
    TokenInfo,
}

impl QueryTemplate {
    /// Name used in configuration errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            QueryTemplate::TvlByNetwork => "platform_tvl_by_network",
            QueryTemplate::VestingVaults => "vesting_vaults",
            QueryTemplate::TokenInfo => "token_info",
        }
    }
}

/// Dune query id for each template; any of them may be left unset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryIds {
    pub tvl_by_network: Option<u64>,
    pub vesting_vaults: Option<u64>,
    pub token_info: Option<u64>,
}

impl Default for QueryIds {
    fn default() -> Self {
        Self {
            tvl_by_network: Some(TVL_BY_NETWORK_QUERY_ID),
            vesting_vaults: None,
            token_info: None,
        }
    }
}

impl QueryIds {
    pub fn get(&self, template: QueryTemplate) -> Option<u64> {
        match template {
            QueryTemplate::TvlByNetwork => self.tvl_by_network,
            QueryTemplate::VestingVaults => self.vesting_vaults,
            QueryTemplate::TokenInfo => self.token_info,
        }
    }
}

/// Fixed polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// Client for running saved queries on Dune
///
/// Holds no per-query state; every call is independent, so one client is
/// shared by all requests.
#[derive(Debug, Clone)]
pub struct DuneClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    query_ids: QueryIds,
    poll: PollSettings,
}

impl DuneClient {
    /// Create a new DuneClient against the public Dune API
    pub fn new(api_key: Option<String>, query_ids: QueryIds) -> Self {
        Self {
            client: Client::new(),
            base_url: DUNE_API_URL.to_string(),
            api_key,
            query_ids,
            poll: PollSettings::default(),
        }
    }

    /// Point the client at another base URL (a mock server in tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the polling schedule
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    fn api_key(&self) -> Result<&str, DuneError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                DuneError::Configuration(
                    "DUNE_API_KEY is not defined in environment variables".to_string(),
                )
            })
    }

    fn query_id(&self, template: QueryTemplate) -> Result<u64, DuneError> {
        self.query_ids
            .get(template)
            .filter(|id| *id != 0)
            .ok_or_else(|| {
                DuneError::Configuration(format!(
                    "Dune query ID ({}) is not configured",
                    template.name()
                ))
            })
    }

    /// Starts an execution of a saved query
    ///
    /// # Arguments
    /// * `query_id` - Dune id of the saved query
    /// * `parameters` - Values for the query's declared parameters
    ///
    /// # Returns
    /// * `Ok(String)` - The execution id to poll
    /// * `Err(DuneError::Configuration)` - No API key, or a zero query id
    /// * `Err(DuneError::Status)` - Dune rejected the request
    pub async fn submit(
        &self,
        query_id: u64,
        parameters: &QueryParameters,
    ) -> Result<String, DuneError> {
        let api_key = self.api_key()?;
        if query_id == 0 {
            return Err(DuneError::Configuration(
                "Dune query ID must be a positive integer".to_string(),
            ));
        }

        let url = format!("{}/query/{}/execute", self.base_url, query_id);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&ExecuteRequest {
                query_parameters: parameters,
            })
            .send()
            .await?;

        let response = check_status(response, "execute")?;
        let execution: ExecuteResponse = response.json().await?;

        debug!(
            query_id,
            execution_id = %execution.execution_id,
            state = %execution.state,
            "Dune execution submitted"
        );
        Ok(execution.execution_id)
    }

    /// Waits for an execution to finish and returns its rows
    ///
    /// Makes at most `max_attempts` status requests, sleeping `interval`
    /// between them. Returns as soon as Dune reports an error or a finished
    /// execution. Cancelling `cancel` aborts the wait, including an in-flight
    /// status request.
    pub async fn poll(
        &self,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, DuneError> {
        let max_attempts = self.poll.max_attempts;

        for attempt in 1..=max_attempts {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DuneError::Cancelled),
                status = self.fetch_status(execution_id) => status?,
            };

            if let Some(failure) = status.error {
                return Err(DuneError::Execution(failure.message));
            }

            if status.is_execution_finished {
                let rows = status.result.and_then(|result| result.rows).unwrap_or_default();
                debug!(execution_id, attempt, rows = rows.len(), "Dune execution finished");
                return Ok(rows);
            }

            debug!(execution_id, attempt, state = %status.state, "Dune execution pending");

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DuneError::Cancelled),
                    _ = tokio::time::sleep(self.poll.interval) => {}
                }
            }
        }

        Err(DuneError::Timeout(max_attempts))
    }

    /// Runs a saved query to completion
    pub async fn run_query(
        &self,
        query_id: u64,
        parameters: &QueryParameters,
    ) -> Result<Vec<Value>, DuneError> {
        self.run_query_until(query_id, parameters, &CancellationToken::new())
            .await
    }

    /// Runs a saved query to completion unless `cancel` fires first
    pub async fn run_query_until(
        &self,
        query_id: u64,
        parameters: &QueryParameters,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, DuneError> {
        let execution_id = self.submit(query_id, parameters).await?;
        info!(query_id, execution_id = %execution_id, "Dune execution started");
        self.poll(&execution_id, cancel).await
    }

    /// Fetches TVL rows for every network in one query
    pub async fn fetch_tvl_all_networks(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, DuneError> {
        self.run_template(QueryTemplate::TvlByNetwork, QueryParameters::new(), cancel)
            .await
    }

    /// Fetches vesting vaults for a Dune chain name (or "all")
    pub async fn fetch_vesting_vaults(
        &self,
        dune_chain: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, DuneError> {
        self.run_template(QueryTemplate::VestingVaults, chain_parameters(dune_chain), cancel)
            .await
    }

    /// Fetches token info for a Dune chain name (or "all")
    pub async fn fetch_token_info(
        &self,
        dune_chain: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, DuneError> {
        self.run_template(QueryTemplate::TokenInfo, chain_parameters(dune_chain), cancel)
            .await
    }

    async fn run_template(
        &self,
        template: QueryTemplate,
        parameters: QueryParameters,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, DuneError> {
        self.api_key()?;
        let query_id = self.query_id(template)?;

        info!(query = template.name(), ?parameters, "Fetching data from Dune API");
        let rows = self.run_query_until(query_id, &parameters, cancel).await?;
        info!(query = template.name(), rows = rows.len(), "Dune data received");
        Ok(rows)
    }

    async fn fetch_status(&self, execution_id: &str) -> Result<ExecutionStatus, DuneError> {
        let url = format!("{}/execution/{}/results", self.base_url, execution_id);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await?;

        let response = check_status(response, "results")?;
        Ok(response.json().await?)
    }
}

fn chain_parameters(dune_chain: &str) -> QueryParameters {
    QueryParameters::from([(SELECTED_CHAIN_PARAM.to_string(), dune_chain.to_string())])
}

fn check_status(response: Response, stage: &'static str) -> Result<Response, DuneError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(DuneError::Status {
        stage,
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
    })
}

/// Body of `POST /query/{id}/execute`
#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    query_parameters: &'a QueryParameters,
}

/// Response of `POST /query/{id}/execute`
#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    execution_id: String,
    #[serde(default)]
    state: String,
}

/// Response of `GET /execution/{id}/results`
#[derive(Debug, Deserialize)]
struct ExecutionStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    is_execution_finished: bool,
    #[serde(default)]
    result: Option<ExecutionResult>,
    #[serde(default)]
    error: Option<ExecutionFailure>,
}

#[derive(Debug, Deserialize)]
struct ExecutionResult {
    #[serde(default)]
    rows: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ExecutionFailure {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, MockDune};
    use axum::http::StatusCode;
    use serde_json::json;

    fn fast_poll(max_attempts: u32) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(5),
            max_attempts,
        }
    }

    fn client_for(mock: &MockDune, max_attempts: u32) -> DuneClient {
        DuneClient::new(
            Some("test-key".to_string()),
            QueryIds {
                tvl_by_network: Some(111),
                vesting_vaults: Some(222),
                token_info: Some(333),
            },
        )
        .with_base_url(mock.base_url())
        .with_poll_settings(fast_poll(max_attempts))
    }

    #[test]
    fn test_default_poll_settings() {
        let poll = PollSettings::default();
        assert_eq!(poll.interval, Duration::from_secs(2));
        assert_eq!(poll.max_attempts, 60);
    }

    #[test]
    fn test_default_query_ids() {
        let ids = QueryIds::default();
        assert_eq!(ids.get(QueryTemplate::TvlByNetwork), Some(6182048));
        assert_eq!(ids.get(QueryTemplate::VestingVaults), None);
        assert_eq!(ids.get(QueryTemplate::TokenInfo), None);
    }

    #[tokio::test]
    async fn test_finished_on_first_poll_returns_rows() {
        let rows = json!([{"network_name": "ethereum", "tvl_usd": "500"}]);
        let mock = MockDune::start(vec![test_support::finished(rows.clone())]).await;
        let client = client_for(&mock, 5);

        let result = client.run_query(111, &QueryParameters::new()).await.unwrap();

        assert_eq!(Value::Array(result), rows);
        assert_eq!(mock.execute_calls(), 1);
        assert_eq!(mock.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_submit_sends_key_and_parameters() {
        let mock = MockDune::start(vec![test_support::finished(json!([]))]).await;
        let client = client_for(&mock, 5);

        let params = QueryParameters::from([
            ("selected_chain".to_string(), "avalanche_c".to_string()),
            ("limit".to_string(), "10".to_string()),
        ]);
        let execution_id = client.submit(42, &params).await.unwrap();

        assert_eq!(execution_id, test_support::EXECUTION_ID);
        let recorded = mock.last_execute().expect("execute should be recorded");
        assert_eq!(recorded.query_id, 42);
        assert_eq!(recorded.api_key.as_deref(), Some("test-key"));
        assert_eq!(
            recorded.body,
            json!({"query_parameters": {"selected_chain": "avalanche_c", "limit": "10"}})
        );
    }

    #[tokio::test]
    async fn test_pending_then_finished() {
        let mock = MockDune::start(vec![
            test_support::pending(),
            test_support::pending(),
            test_support::finished(json!([{"id": 1}])),
        ])
        .await;
        let client = client_for(&mock, 10);

        let rows = client.run_query(111, &QueryParameters::new()).await.unwrap();

        assert_eq!(rows, vec![json!({"id": 1})]);
        assert_eq!(mock.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_finished_without_rows_is_empty() {
        let mock = MockDune::start(vec![json!({
            "execution_id": test_support::EXECUTION_ID,
            "state": "QUERY_STATE_COMPLETED",
            "is_execution_finished": true
        })])
        .await;
        let client = client_for(&mock, 3);

        let rows = client.run_query(111, &QueryParameters::new()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_times_out_after_exact_attempt_count() {
        let mock = MockDune::start(vec![test_support::pending()]).await;
        let client = client_for(&mock, 4);

        let err = client.run_query(111, &QueryParameters::new()).await.unwrap_err();

        assert!(matches!(err, DuneError::Timeout(4)));
        assert_eq!(mock.status_calls(), 4);
    }

    #[tokio::test]
    async fn test_execution_error_stops_polling() {
        let mock = MockDune::start(vec![
            test_support::pending(),
            test_support::failed("line 3: syntax error"),
            test_support::finished(json!([])),
        ])
        .await;
        let client = client_for(&mock, 10);

        let err = client.run_query(111, &QueryParameters::new()).await.unwrap_err();

        match err {
            DuneError::Execution(message) => assert_eq!(message, "line 3: syntax error"),
            other => panic!("expected execution error, got {other:?}"),
        }
        assert_eq!(mock.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_execute_http_failure_is_status_error() {
        let mock = MockDune::start_with_statuses(
            StatusCode::UNAUTHORIZED,
            StatusCode::OK,
            vec![test_support::finished(json!([]))],
        )
        .await;
        let client = client_for(&mock, 3);

        let err = client.run_query(111, &QueryParameters::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "Dune execute error: 401 Unauthorized");
        assert_eq!(mock.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_results_http_failure_is_status_error() {
        let mock = MockDune::start_with_statuses(
            StatusCode::OK,
            StatusCode::INTERNAL_SERVER_ERROR,
            vec![test_support::finished(json!([]))],
        )
        .await;
        let client = client_for(&mock, 3);

        let err = client.run_query(111, &QueryParameters::new()).await.unwrap_err();

        assert!(matches!(
            err,
            DuneError::Status {
                stage: "results",
                status: 500,
                ..
            }
        ));
        assert_eq!(mock.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_api_key_never_reaches_network() {
        let mock = MockDune::start(vec![test_support::finished(json!([]))]).await;
        let client = DuneClient::new(None, QueryIds::default()).with_base_url(mock.base_url());

        let err = client
            .fetch_tvl_all_networks(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DuneError::Configuration(_)));
        assert!(err.to_string().contains("DUNE_API_KEY"));
        assert_eq!(mock.execute_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_api_key_is_missing() {
        let client = DuneClient::new(Some(String::new()), QueryIds::default());
        let err = client.submit(1, &QueryParameters::new()).await.unwrap_err();
        assert!(matches!(err, DuneError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_zero_query_id_is_rejected() {
        let client = DuneClient::new(Some("key".to_string()), QueryIds::default());
        let err = client.submit(0, &QueryParameters::new()).await.unwrap_err();
        assert!(matches!(err, DuneError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_template_is_configuration_error() {
        let mock = MockDune::start(vec![test_support::finished(json!([]))]).await;
        let client = DuneClient::new(Some("key".to_string()), QueryIds::default())
            .with_base_url(mock.base_url());

        let err = client
            .fetch_vesting_vaults("ethereum", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Dune query ID (vesting_vaults) is not configured"
        );
        assert_eq!(mock.execute_calls(), 0);
    }

    #[tokio::test]
    async fn test_chain_templates_pass_selected_chain() {
        let mock = MockDune::start(vec![test_support::finished(json!([{"token": "X"}]))]).await;
        let client = client_for(&mock, 3);

        let rows = client
            .fetch_token_info("avalanche_c", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rows, vec![json!({"token": "X"})]);
        let recorded = mock.last_execute().unwrap();
        assert_eq!(recorded.query_id, 333);
        assert_eq!(
            recorded.body,
            json!({"query_parameters": {"selected_chain": "avalanche_c"}})
        );

        client
            .fetch_vesting_vaults("all", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mock.last_execute().unwrap().query_id, 222);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_poll() {
        let mock = MockDune::start(vec![test_support::pending()]).await;
        let client = DuneClient::new(Some("key".to_string()), QueryIds::default())
            .with_base_url(mock.base_url())
            .with_poll_settings(PollSettings {
                interval: Duration::from_secs(30),
                max_attempts: 60,
            });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client.run_query_until(111, &QueryParameters::new(), &cancel).await.unwrap_err();

        assert!(matches!(err, DuneError::Cancelled));
        assert_eq!(mock.status_calls(), 1);
    }
}
