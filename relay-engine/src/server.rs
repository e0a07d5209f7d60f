//! HTTP surface for the relay.
//!
//! Thin by design: handlers parse the wire shapes, call the `Relay`
//! command processor and map its errors to status codes. Money fields
//! travel as decimal strings of wei.

use crate::auction::AuctionError;
use crate::decoder::DecodeError;
use crate::registry::AccessError;
use crate::relay::{Relay, RelayError};
use crate::results::StoreError;
use crate::scheduler::SchedulerError;
use crate::transaction::TxHash;
use crate::transaction_pool::PoolError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub type AppState = Arc<Relay>;

/// Build the relay's router.
pub fn build_router(relay: AppState) -> Router {
    Router::new()
        .route("/submitTx", post(submit_tx))
        .route("/register", post(register))
        .route("/status", get(status))
        .route("/txPool", get(tx_pool))
        .route("/submitBid", post(submit_bid))
        .route("/results", get(results))
        .with_state(relay)
}

/// Bind and serve until the process stops.
pub async fn serve(relay: AppState, port: u16) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Relay API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(relay)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

enum ApiError {
    BadRequest(String),
    Relay(RelayError),
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        ApiError::Relay(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Relay(err) => (relay_error_code(&err), err.to_string()),
        };
        (code, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn relay_error_code(err: &RelayError) -> StatusCode {
    match err {
        RelayError::InvalidTransaction(DecodeError::Oversized { .. }) => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        RelayError::InvalidTransaction(_) => StatusCode::BAD_REQUEST,
        RelayError::Pool(PoolError::DuplicateTransaction(_)) => StatusCode::CONFLICT,
        RelayError::Pool(PoolError::UnknownTransaction(_)) => StatusCode::NOT_FOUND,
        RelayError::Auction(AuctionError::UnknownTransaction(_)) => StatusCode::NOT_FOUND,
        RelayError::Auction(AuctionError::ReserveNotMet { .. }) => StatusCode::BAD_REQUEST,
        RelayError::Auction(_) => StatusCode::CONFLICT,
        RelayError::Store(StoreError::SlotNotSettled(_)) => StatusCode::NOT_FOUND,
        RelayError::Store(StoreError::SlotAlreadyRecorded(_)) => StatusCode::CONFLICT,
        RelayError::Access(AccessError::UnknownBuilder(_)) => StatusCode::NOT_FOUND,
        RelayError::Access(AccessError::AlreadyRegistered(_)) => StatusCode::CONFLICT,
        RelayError::Access(AccessError::AccessRestricted(_)) => StatusCode::FORBIDDEN,
        RelayError::Scheduler(SchedulerError::OutOfOrderSlot { .. }) => StatusCode::CONFLICT,
        RelayError::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_hash(s: &str) -> Result<TxHash, ApiError> {
    TxHash::parse(s).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn parse_wei(s: &str) -> Result<u128, ApiError> {
    s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid wei amount `{s}`")))
}

fn parse_raw_tx(s: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| ApiError::BadRequest(format!("invalid raw transaction hex: {e}")))
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SubmitTxRequest {
    #[serde(rename = "rawTx")]
    raw_tx: String,
}

#[derive(Serialize)]
struct SubmitTxResponse {
    #[serde(rename = "txHash")]
    tx_hash: String,
}

#[derive(Deserialize)]
struct BuilderRequest {
    #[serde(rename = "pubKey")]
    pub_key: String,
}

#[derive(Serialize)]
struct StatusResponse {
    access: bool,
    #[serde(rename = "pendingPayment")]
    pending_payment: String,
}

#[derive(Serialize)]
struct PoolEntry {
    data: serde_json::Value,
    reserve: String,
}

#[derive(Deserialize)]
struct SubmitBidRequest {
    #[serde(rename = "pubKey")]
    pub_key: String,
    #[serde(rename = "txHash")]
    tx_hash: String,
    value: String,
}

#[derive(Serialize)]
struct SubmitBidResponse {
    slot: String,
}

#[derive(Deserialize)]
struct ResultsRequest {
    #[serde(rename = "pubKey")]
    pub_key: String,
    slot: u64,
}

#[derive(Serialize)]
struct ResultsResponse {
    total_payment: String,
    transactions: Vec<WonEntry>,
}

#[derive(Serialize)]
struct WonEntry {
    payment: String,
    data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_tx(
    State(relay): State<AppState>,
    Json(req): Json<SubmitTxRequest>,
) -> Result<Json<SubmitTxResponse>, ApiError> {
    let raw = parse_raw_tx(&req.raw_tx)?;
    let hash = relay.submit_tx(&raw).await?;
    Ok(Json(SubmitTxResponse {
        tx_hash: hash.to_string(),
    }))
}

async fn register(
    State(relay): State<AppState>,
    Json(req): Json<BuilderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    relay.register(&req.pub_key).await?;
    Ok(Json(serde_json::json!({ "status": true })))
}

async fn status(
    State(relay): State<AppState>,
    Json(req): Json<BuilderRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = relay.status(&req.pub_key).await?;
    Ok(Json(StatusResponse {
        access: status.access,
        pending_payment: status.pending_payment.to_string(),
    }))
}

async fn tx_pool(
    State(relay): State<AppState>,
    Json(req): Json<BuilderRequest>,
) -> Result<Json<Vec<PoolEntry>>, ApiError> {
    let available = relay.tx_pool(&req.pub_key).await?;
    let entries = available
        .into_iter()
        .map(|tx| PoolEntry {
            data: tx.payload,
            reserve: tx.reserve.to_string(),
        })
        .collect();
    Ok(Json(entries))
}

async fn submit_bid(
    State(relay): State<AppState>,
    Json(req): Json<SubmitBidRequest>,
) -> Result<Json<SubmitBidResponse>, ApiError> {
    let hash = parse_hash(&req.tx_hash)?;
    let value = parse_wei(&req.value)?;
    let slot = relay.submit_bid(&req.pub_key, hash, value).await?;
    Ok(Json(SubmitBidResponse {
        slot: slot.to_string(),
    }))
}

async fn results(
    State(relay): State<AppState>,
    Json(req): Json<ResultsRequest>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let results = relay.results(&req.pub_key, req.slot).await?;
    Ok(Json(ResultsResponse {
        total_payment: results.total_payment.to_string(),
        transactions: results
            .transactions
            .into_iter()
            .map(|t| WonEntry {
                payment: t.payment.to_string(),
                data: t.data,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MockDecoder;
    use crate::mempool::RecordingBroadcaster;
    use crate::registry::InMemoryRegistry;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::util::ServiceExt;

    fn test_router() -> Router {
        let relay = Arc::new(Relay::new(
            0,
            Arc::new(MockDecoder::new(100)),
            Arc::new(InMemoryRegistry::new()),
            Arc::new(RecordingBroadcaster::new()),
        ));
        build_router(relay)
    }

    fn json_request(method: Method, path: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_status() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/register",
                serde_json::json!({ "pubKey": "0xbuilder" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(json_request(
                Method::GET,
                "/status",
                serde_json::json!({ "pubKey": "0xbuilder" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["access"], serde_json::json!(true));
        assert_eq!(body["pendingPayment"], serde_json::json!("0"));
    }

    #[tokio::test]
    async fn test_double_register_conflict() {
        let router = test_router();
        let req = || {
            json_request(
                Method::POST,
                "/register",
                serde_json::json!({ "pubKey": "0xbuilder" }),
            )
        };
        router.clone().oneshot(req()).await.unwrap();
        let response = router.oneshot(req()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_tx_pool_requires_registration() {
        let router = test_router();
        let response = router
            .oneshot(json_request(
                Method::GET,
                "/txPool",
                serde_json::json!({ "pubKey": "0xghost" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("not registered"));
    }

    #[tokio::test]
    async fn test_submit_tx_then_bid_returns_open_slot() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/submitTx",
                serde_json::json!({ "rawTx": format!("0x{}", hex::encode(b"tx-1")) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tx_hash = body_json(response).await["txHash"]
            .as_str()
            .unwrap()
            .to_string();

        router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/register",
                serde_json::json!({ "pubKey": "0xbuilder" }),
            ))
            .await
            .unwrap();

        let response = router
            .oneshot(json_request(
                Method::POST,
                "/submitBid",
                serde_json::json!({
                    "pubKey": "0xbuilder",
                    "txHash": tx_hash,
                    "value": "500",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["slot"], serde_json::json!("0"));
    }

    #[tokio::test]
    async fn test_submit_tx_rejects_bad_hex() {
        let router = test_router();
        let response = router
            .oneshot(json_request(
                Method::POST,
                "/submitTx",
                serde_json::json!({ "rawTx": "0xzz" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_results_for_unsettled_slot() {
        let router = test_router();
        router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/register",
                serde_json::json!({ "pubKey": "0xbuilder" }),
            ))
            .await
            .unwrap();

        let response = router
            .oneshot(json_request(
                Method::GET,
                "/results",
                serde_json::json!({ "pubKey": "0xbuilder", "slot": 3 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
