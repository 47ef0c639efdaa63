use crate::config::ApiConfig;
use crate::core::{Block, ChainState, Transaction, UtxoEntry};
use crate::crypto::hash::Hash256;
use crate::crypto::keys::{Address, KeyPair};
use crate::ledger::Ledger;
use crate::mining::MiningStats;
use crate::{LedgerError, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail<T>(status: StatusCode, message: String) -> ApiResult<T> {
    (status, Json(ApiResponse::error(message)))
}

fn rejected<T>(error: LedgerError) -> ApiResult<T> {
    let status = match &error {
        LedgerError::MiningInterrupted(_) => StatusCode::CONFLICT,
        e if e.is_rejection() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, error.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub chain: ChainState,
    pub mempool_size: usize,
    pub mining: MiningStats,
    pub node_address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub address: Address,
    pub balance: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlocksQuery {
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub node_key: Arc<KeyPair>,
}

pub struct RestApi {
    ledger: Arc<Ledger>,
    node_key: Arc<KeyPair>,
    config: ApiConfig,
}

impl RestApi {
    pub fn new(ledger: Arc<Ledger>, node_key: KeyPair, config: ApiConfig) -> Self {
        Self {
            ledger,
            node_key: Arc::new(node_key),
            config,
        }
    }

    pub async fn start(self) -> Result<()> {
        log::info!("Starting REST API on port {}", self.config.rest_port);

        let app = self.router();
        let addr = format!("0.0.0.0:{}", self.config.rest_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        log::info!("REST API listening on http://{}", addr);

        axum::serve(listener, app).await?;

        Ok(())
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            ledger: self.ledger.clone(),
            node_key: self.node_key.clone(),
        };
        create_router(state, &self.config.cors_origins)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin {}", o);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/info", get(get_node_info))

        // Blocks
        .route("/api/v1/blocks", get(get_blocks).post(mine_block))
        .route("/api/v1/blocks/latest", get(get_latest_block))
        .route("/api/v1/blocks/submit", post(submit_block))
        .route("/api/v1/blocks/:hash", get(get_block_by_hash))
        .route("/api/v1/chain/submit", post(submit_chain))

        // Transactions
        .route("/api/v1/transactions", post(send_transaction))
        .route("/api/v1/transactions/submit", post(submit_transaction))
        .route("/api/v1/transactions/:id", get(get_transaction))
        .route("/api/v1/mempool", get(get_mempool))

        // Balances
        .route("/api/v1/utxos", get(get_utxos))
        .route("/api/v1/addresses/:address/balance", get(get_address_balance))
        .route("/api/v1/addresses/:address/utxos", get(get_address_utxos))
        .route("/api/v1/me/address", get(get_my_address))
        .route("/api/v1/me/balance", get(get_my_balance))

        .layer(ServiceBuilder::new().layer(cors_layer(cors_origins)))
        .with_state(state)
}

// Handler functions

async fn health_check() -> ApiResult<HashMap<String, String>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339());
    ok(status)
}

async fn get_node_info(State(state): State<AppState>) -> ApiResult<NodeInfo> {
    ok(NodeInfo {
        chain: state.ledger.get_chain_info(),
        mempool_size: state.ledger.get_mempool().len(),
        mining: state.ledger.mining_stats(),
        node_address: state.node_key.address.clone(),
    })
}

/// Full chain from genesis, or the newest `limit` blocks newest first.
async fn get_blocks(State(state): State<AppState>, Query(query): Query<BlocksQuery>) -> ApiResult<Vec<Block>> {
    match query.limit {
        Some(limit) => ok(state.ledger.get_latest_blocks(limit)),
        None => ok(state.ledger.get_chain()),
    }
}

async fn get_latest_block(State(state): State<AppState>) -> ApiResult<Block> {
    ok(state.ledger.get_latest_block())
}

async fn get_block_by_hash(State(state): State<AppState>, Path(hash_str): Path<String>) -> ApiResult<Block> {
    let hash = match Hash256::from_hex(&hash_str) {
        Ok(hash) => hash,
        Err(_) => return fail(StatusCode::BAD_REQUEST, "Invalid block hash".to_string()),
    };

    match state.ledger.get_block_by_hash(&hash) {
        Some(block) => ok(block),
        None => fail(StatusCode::NOT_FOUND, "Block not found".to_string()),
    }
}

/// Mines one block paying the node's own address.
async fn mine_block(State(state): State<AppState>) -> ApiResult<Block> {
    let ledger = state.ledger.clone();
    let address = state.node_key.address.clone();

    match tokio::task::spawn_blocking(move || ledger.create_and_broadcast_block(&address)).await {
        Ok(Ok(block)) => ok(block),
        Ok(Err(e)) => rejected(e),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, format!("Mining task failed: {}", e)),
    }
}

async fn submit_block(State(state): State<AppState>, Json(block): Json<Block>) -> ApiResult<Block> {
    match state.ledger.submit_candidate_block(block.clone()) {
        Ok(()) => ok(block),
        Err(e) => rejected(e),
    }
}

async fn submit_chain(State(state): State<AppState>, Json(blocks): Json<Vec<Block>>) -> ApiResult<ChainState> {
    let ledger = state.ledger.clone();

    // full replay of the candidate, keep it off the async workers
    match tokio::task::spawn_blocking(move || ledger.submit_candidate_chain(blocks)).await {
        Ok(Ok(())) => ok(state.ledger.get_chain_info()),
        Ok(Err(e)) => rejected(e),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, format!("Replay task failed: {}", e)),
    }
}

async fn get_transaction(State(state): State<AppState>, Path(id_str): Path<String>) -> ApiResult<Transaction> {
    let id = match Hash256::from_hex(&id_str) {
        Ok(id) => id,
        Err(_) => return fail(StatusCode::BAD_REQUEST, "Invalid transaction id".to_string()),
    };

    match state.ledger.get_transaction_by_id(&id) {
        Some(tx) => ok(tx),
        None => fail(StatusCode::NOT_FOUND, "Transaction not found".to_string()),
    }
}

/// Pays `amount` to `address` from the node's own outputs.
async fn send_transaction(State(state): State<AppState>, Json(req): Json<SendRequest>) -> ApiResult<Transaction> {
    let receiver = match Address::parse(&req.address) {
        Ok(address) => address,
        Err(e) => return rejected(e),
    };

    match state.ledger.create_and_submit_transaction(&state.node_key.private_key, &receiver, req.amount) {
        Ok(tx) => ok(tx),
        Err(e) => rejected(e),
    }
}

async fn submit_transaction(State(state): State<AppState>, Json(tx): Json<Transaction>) -> ApiResult<Hash256> {
    let id = tx.id;
    match state.ledger.submit_transaction(tx) {
        Ok(()) => ok(id),
        Err(e) => rejected(e),
    }
}

async fn get_mempool(State(state): State<AppState>) -> ApiResult<Vec<Transaction>> {
    ok(state.ledger.get_mempool())
}

async fn get_utxos(State(state): State<AppState>) -> ApiResult<Vec<UtxoEntry>> {
    ok(state.ledger.get_utxo_snapshot())
}

async fn get_address_balance(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult<BalanceInfo> {
    match Address::parse(&address) {
        Ok(address) => {
            let balance = state.ledger.get_balance(&address);
            ok(BalanceInfo { address, balance })
        }
        Err(e) => rejected(e),
    }
}

async fn get_address_utxos(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult<Vec<UtxoEntry>> {
    match Address::parse(&address) {
        Ok(address) => ok(state.ledger.get_utxos_for_address(&address)),
        Err(e) => rejected(e),
    }
}

async fn get_my_address(State(state): State<AppState>) -> ApiResult<Address> {
    ok(state.node_key.address.clone())
}

async fn get_my_balance(State(state): State<AppState>) -> ApiResult<BalanceInfo> {
    let address = state.node_key.address.clone();
    let balance = state.ledger.get_balance(&address);
    ok(BalanceInfo { address, balance })
}
