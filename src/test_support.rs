//! In-process fakes of the upstream providers for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Execution id handed out by [`MockDune`]
pub const EXECUTION_ID: &str = "01HTESTEXECUTION";

/// Status body of a finished execution
pub fn finished(rows: Value) -> Value {
    json!({
        "execution_id": EXECUTION_ID,
        "state": "QUERY_STATE_COMPLETED",
        "is_execution_finished": true,
        "result": { "rows": rows, "metadata": {} }
    })
}

/// Status body of a running execution
pub fn pending() -> Value {
    json!({
        "execution_id": EXECUTION_ID,
        "state": "QUERY_STATE_EXECUTING",
        "is_execution_finished": false
    })
}

/// Status body of a failed execution
pub fn failed(message: &str) -> Value {
    json!({
        "execution_id": EXECUTION_ID,
        "state": "QUERY_STATE_FAILED",
        "is_execution_finished": true,
        "error": { "message": message }
    })
}

/// An execute request as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedExecute {
    pub query_id: u64,
    pub api_key: Option<String>,
    pub body: Value,
}

struct DuneState {
    execute_status: StatusCode,
    results_status: StatusCode,
    responses: Mutex<VecDeque<Value>>,
    execute_calls: AtomicUsize,
    status_calls: AtomicUsize,
    last_execute: Mutex<Option<RecordedExecute>>,
}

/// Fake Dune API serving a scripted sequence of status bodies
///
/// Each status request consumes the next body; the last one repeats forever.
pub struct MockDune {
    base_url: String,
    state: Arc<DuneState>,
}

impl MockDune {
    pub async fn start(responses: Vec<Value>) -> Self {
        Self::start_with_statuses(StatusCode::OK, StatusCode::OK, responses).await
    }

    pub async fn start_with_statuses(
        execute_status: StatusCode,
        results_status: StatusCode,
        responses: Vec<Value>,
    ) -> Self {
        let state = Arc::new(DuneState {
            execute_status,
            results_status,
            responses: Mutex::new(responses.into()),
            execute_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            last_execute: Mutex::new(None),
        });

        let app = Router::new()
            .route("/query/:query_id/execute", post(dune_execute))
            .route("/execution/:execution_id/results", get(dune_results))
            .with_state(state.clone());

        let base_url = serve(app).await;
        Self { base_url, state }
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub fn execute_calls(&self) -> usize {
        self.state.execute_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.state.status_calls.load(Ordering::SeqCst)
    }

    pub fn last_execute(&self) -> Option<RecordedExecute> {
        self.state.last_execute.lock().unwrap().clone()
    }
}

async fn dune_execute(
    State(state): State<Arc<DuneState>>,
    Path(query_id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.execute_calls.fetch_add(1, Ordering::SeqCst);
    let api_key = headers
        .get("x-dune-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    *state.last_execute.lock().unwrap() = Some(RecordedExecute {
        query_id,
        api_key,
        body,
    });

    if !state.execute_status.is_success() {
        return (state.execute_status, Json(json!({"error": "rejected"})));
    }

    (
        StatusCode::OK,
        Json(json!({"execution_id": EXECUTION_ID, "state": "QUERY_STATE_PENDING"})),
    )
}

async fn dune_results(
    State(state): State<Arc<DuneState>>,
    Path(_execution_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.status_calls.fetch_add(1, Ordering::SeqCst);

    if !state.results_status.is_success() {
        return (state.results_status, Json(json!({"error": "unavailable"})));
    }

    let mut responses = state.responses.lock().unwrap();
    let body = if responses.len() > 1 {
        responses.pop_front().unwrap_or(Value::Null)
    } else {
        responses.front().cloned().unwrap_or(Value::Null)
    };
    (StatusCode::OK, Json(body))
}

/// Fake CoinGecko API echoing the requested coin id
pub struct MockCoinGecko {
    base_url: String,
    calls: Arc<AtomicUsize>,
}

impl MockCoinGecko {
    pub async fn start() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/coins/:coin_id", get(coingecko_coin))
            .with_state(calls.clone());

        let base_url = serve(app).await;
        Self { base_url, calls }
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn coingecko_coin(
    State(calls): State<Arc<AtomicUsize>>,
    Path(coin_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    calls.fetch_add(1, Ordering::SeqCst);

    if coin_id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "coin not found"})));
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": coin_id,
            "symbol": "btc",
            "market_data": { "current_price": { "usd": 64000.5 } }
        })),
    )
}

/// Serves `app` on an ephemeral local port and returns its base URL
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("mock server should bind");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}
