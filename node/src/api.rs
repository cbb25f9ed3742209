//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the balances node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                      | Description                          |
//! |--------|---------------------------|--------------------------------------|
//! | GET    | `/health`                 | Liveness check                       |
//! | GET    | `/status`                 | Runtime shape and chain height       |
//! | GET    | `/balances/:address`      | Current derived balances             |
//! | GET    | `/ws/balances/:address`   | WebSocket pushing every update       |
//!
//! `/metrics` is served separately, see [`create_metrics_router`].

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nova_derive::{BalanceDeriver, DeriveError, MemoryChain, RuntimeRegistry};

use crate::metrics::{metrics_handler, SharedMetrics};

/// How long `GET /balances/:address` waits for the first derived value.
const BALANCE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The devnet chain, used for status reporting.
    pub chain: Arc<MemoryChain>,
    /// Derivation entry point. One deriver means one sharing scope for the
    /// whole node: concurrent clients watching the same address share a
    /// derivation.
    pub deriver: Arc<BalanceDeriver>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    fn refresh_active_derivations(&self) {
        self.metrics
            .active_derivations
            .set(self.deriver.cache().len() as i64);
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API [`Router`] with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/balances/:address", get(balances_handler))
        .route("/ws/balances/:address", get(ws_balances_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the router served on the metrics port.
pub fn create_metrics_router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Runtime spec name.
    pub spec_name: String,
    /// `legacy` or `current`.
    pub runtime_shape: String,
    /// Balances instances results are reported for.
    pub instances: usize,
    /// Current best block.
    pub best_number: u64,
    /// Addresses with a live derivation.
    pub active_derivations: usize,
}

/// Error body for failed derivations.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn status_for(err: &DeriveError) -> StatusCode {
    match err {
        DeriveError::MalformedSchedule { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DeriveError::UnexpectedReply(_) | DeriveError::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — runtime shape and chain height.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.refresh_active_derivations();
    let adapter = state.deriver.adapter();

    Json(StatusResponse {
        version: state.version.clone(),
        spec_name: state.chain.spec_name(),
        runtime_shape: adapter.shape().to_string(),
        instances: adapter.instance_count(),
        best_number: state.chain.best_number_now(),
        active_derivations: state.deriver.cache().len(),
    })
}

/// `GET /balances/:address` — the first derived snapshot for `address`.
///
/// Addresses without an on-chain account get a zero-valued body, not 404.
async fn balances_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Response {
    state.metrics.balance_requests_total.inc();

    let mut feed = state.deriver.derive_all_balances(&address);
    state.refresh_active_derivations();
    let first = tokio::time::timeout(BALANCE_REQUEST_TIMEOUT, feed.next()).await;
    drop(feed);
    state.refresh_active_derivations();

    match first {
        Ok(Some(Ok(derived))) => Json(derived).into_response(),
        Ok(Some(Err(err))) => {
            state.metrics.derivation_failures_total.inc();
            tracing::warn!(%address, error = %err, "balance request failed");
            error_response(status_for(&err), err)
        }
        Ok(None) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "derivation ended without a value",
        ),
        Err(_) => error_response(StatusCode::GATEWAY_TIMEOUT, "timed out waiting for chain data"),
    }
}

/// `GET /ws/balances/:address` — upgrades to a WebSocket that pushes every
/// derived update for `address` as a JSON text frame.
///
/// A failed derivation sends one `{"error": ...}` frame and closes. Client
/// messages are ignored.
async fn ws_balances_handler(
    ws: WebSocketUpgrade,
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    state.metrics.balance_requests_total.inc();
    ws.on_upgrade(move |socket| handle_ws_connection(socket, address, state))
}

/// Drives a single WebSocket connection until the client disconnects or
/// the derivation ends.
async fn handle_ws_connection(mut socket: WebSocket, address: String, state: AppState) {
    state.metrics.ws_connections.inc();
    let mut feed = state.deriver.derive_all_balances(&address);
    state.refresh_active_derivations();
    tracing::debug!(%address, "balance websocket opened");

    loop {
        tokio::select! {
            item = feed.next() => {
                let payload = match item {
                    Some(Ok(derived)) => serde_json::to_string(&derived),
                    Some(Err(err)) => {
                        state.metrics.derivation_failures_total.inc();
                        let body = ErrorResponse { error: err.to_string() };
                        if let Ok(payload) = serde_json::to_string(&body) {
                            let _ = socket.send(Message::Text(payload)).await;
                        }
                        break;
                    }
                    None => break,
                };
                match payload {
                    Ok(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("failed to serialize derived balances: {}", e);
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    drop(feed);
    state.metrics.ws_connections.dec();
    state.refresh_active_derivations();
    tracing::debug!(%address, "balance websocket closed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::Genesis;
    use crate::metrics::NodeMetrics;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use nova_derive::VestingSchedule;
    use tower::ServiceExt;

    fn state_from(genesis: &Genesis) -> AppState {
        let chain = genesis.build_chain().unwrap();
        let deriver = Arc::new(BalanceDeriver::new(chain.clone(), chain.as_ref()));
        AppState {
            version: "0.1.0-test".into(),
            chain,
            deriver,
            metrics: Arc::new(NodeMetrics::new().unwrap()),
        }
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn get_json(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = get(router, path).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(state_from(&Genesis::devnet()));
        let (status, json) = get_json(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_runtime_shape() {
        let router = create_router(state_from(&Genesis::devnet()));
        let (status, json) = get_json(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["runtime_shape"], "current");
        assert_eq!(json["instances"], 2);
        assert_eq!(json["best_number"], 1);
        assert_eq!(json["spec_name"], "nova-devnet");
    }

    #[tokio::test]
    async fn balances_endpoint_returns_derived_snapshot() {
        let state = state_from(&Genesis::devnet());
        let metrics = state.metrics.clone();
        let router = create_router(state);

        let (status, json) = get_json(&router, "/balances/nova1alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["accountId"], "nova1alice");
        assert_eq!(json["accountNonce"], 3);
        assert_eq!(json["freeBalance"], "1000000");
        assert_eq!(json["lockedBalance"], "500000");
        assert_eq!(json["availableBalance"], "500000");
        assert_eq!(json["vestingLocked"], "500000");
        assert_eq!(json["isVesting"], false);
        assert_eq!(json["namedReserves"][0]["amount"], "5000");
        assert_eq!(json["additional"][0]["lockedBalance"], "7500");
        assert_eq!(json["additional"][0]["availableBalance"], "12500");
        assert_eq!(metrics.balance_requests_total.get(), 1);
    }

    #[tokio::test]
    async fn fully_frozen_account_has_nothing_available() {
        let router = create_router(state_from(&Genesis::devnet()));
        let (status, json) = get_json(&router, "/balances/nova1bob").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["availableBalance"], "0");
        assert_eq!(json["lockedBalance"], "0");
    }

    #[tokio::test]
    async fn unknown_address_returns_zero_body() {
        let router = create_router(state_from(&Genesis::devnet()));
        let (status, json) = get_json(&router, "/balances/nova1nobody").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["accountId"], "");
        assert_eq!(json["freeBalance"], "0");
        assert_eq!(json["availableBalance"], "0");
    }

    #[tokio::test]
    async fn malformed_schedule_is_unprocessable() {
        let mut genesis = Genesis::devnet();
        genesis.accounts[2].vesting = Some(VestingSchedule {
            total: 100,
            per_block: 0,
            starting_block: 0,
        });
        let state = state_from(&genesis);
        let metrics = state.metrics.clone();
        let router = create_router(state);

        let (status, json) = get_json(&router, "/balances/nova1carol").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().unwrap().contains("per_block"));
        assert_eq!(metrics.derivation_failures_total.get(), 1);

        let (status, _) = get(&router, "/balances/nova1alice").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let state = state_from(&Genesis::devnet());
        let metrics = state.metrics.clone();
        let router = create_router(state);
        get(&router, "/balances/nova1alice").await;

        let (status, body) = get(&create_metrics_router(metrics), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("nova_balance_requests_total 1"));
    }
}
