//! REST API server for LedgerChain
//!
//! Wire-compatible node endpoints: staging transactions, mining, serving the
//! chain to peers, registering peers and resolving conflicts.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::{Block, ChainSnapshot};
use crate::error::ChainError;
use crate::network::normalize_peer_address;
use crate::node::Node;
use crate::transaction::Transaction;

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BlockchainError(ChainError::InvalidPeerAddress(msg)) => {
                (StatusCode::BAD_REQUEST, format!("Invalid peer address: {}", msg))
            }
            ApiError::BlockchainError(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct TransactionResponse {
    pub message: String,
    pub index: u64,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub message: String,
    #[serde(flatten)]
    pub block: Block,
}

#[derive(Deserialize)]
pub struct RegisterNodesRequest {
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Serialize)]
pub struct RegisterNodesResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_chain: Option<Vec<Block>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<Block>>,
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/transactions/new", post(new_transaction))
        .route("/mine", get(mine))
        .route("/chain", get(full_chain))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve_nodes))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(node)
        .layer(cors)
}

/// Serve the API on `0.0.0.0:port` until the process is stopped.
pub async fn run_api_server(node: Arc<Node>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(node);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "node_id": node.identifier(),
        "length": node.chain_length().await,
        "peers": node.peers().len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn new_transaction(
    State(node): State<Arc<Node>>,
    payload: Result<Json<Transaction>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let Json(tx) = payload.map_err(|e| ApiError::InvalidInput(format!("Missing values: {}", e.body_text())))?;
    let index = node.submit_transaction(tx).await;

    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", index),
            index,
        }),
    ))
}

async fn mine(State(node): State<Arc<Node>>) -> Result<Json<MineResponse>, ApiError> {
    let block = node.mine_with_reward().await?;

    Ok(Json(MineResponse {
        message: "New Block Forged".to_string(),
        block,
    }))
}

async fn full_chain(State(node): State<Arc<Node>>) -> Json<ChainSnapshot> {
    Json(node.chain_snapshot().await)
}

async fn register_nodes(
    State(node): State<Arc<Node>>,
    payload: Result<Json<RegisterNodesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterNodesResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    if req.nodes.is_empty() {
        return Err(ApiError::InvalidInput(
            "Error: Please supply a valid list of nodes".to_string(),
        ));
    }

    // Reject the whole batch before registering anything.
    for address in &req.nodes {
        normalize_peer_address(address)?;
    }
    for address in &req.nodes {
        node.register_peer(address)?;
    }

    let mut total_nodes = node.peers();
    total_nodes.sort();
    Ok((
        StatusCode::CREATED,
        Json(RegisterNodesResponse {
            message: "New nodes have been added".to_string(),
            total_nodes,
        }),
    ))
}

async fn resolve_nodes(State(node): State<Arc<Node>>) -> Json<ResolveResponse> {
    let replaced = node.resolve_consensus().await;
    let chain = node.chain_snapshot().await.chain;

    Json(if replaced {
        ResolveResponse {
            message: "Our chain was replaced".to_string(),
            new_chain: Some(chain),
            chain: None,
        }
    } else {
        ResolveResponse {
            message: "Our chain is authoritative".to_string(),
            new_chain: None,
            chain: Some(chain),
        }
    })
}
