//! REST API for LinkChain
//!
//! A thin layer that marshals [`Node`] operations to and from JSON. Routes:
//!
//! | Method | Path                | Operation                           |
//! |--------|---------------------|-------------------------------------|
//! | GET    | `/mine`             | mine and seal a block               |
//! | POST   | `/transactions/new` | queue a transaction                 |
//! | GET    | `/chain`            | full chain and its length           |
//! | POST   | `/nodes/register`   | add peers                           |
//! | GET    | `/nodes/resolve`    | run longest-chain resolution        |
//! | GET    | `/health`           | liveness and node summary           |

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

use crate::blockchain::Block;
use crate::error::ChainError;
use crate::network::{ChainResponse, PeerAddress};
use crate::node::Node;
use crate::transaction::{NewTransactionRequest, Transaction};

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
            ApiError::BlockchainError(e) => {
                let status = match &e {
                    ChainError::MissingField(_)
                    | ChainError::InvalidTransaction(_)
                    | ChainError::InvalidPeerAddress(_) => StatusCode::BAD_REQUEST,
                    ChainError::MiningCancelled => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
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

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize, Deserialize)]
pub struct MineResponse {
    pub message: String,
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

#[derive(Serialize, Deserialize)]
pub struct TransactionResponse {
    pub message: String,
    pub index: u64,
}

#[derive(Deserialize)]
pub struct RegisterNodesRequest {
    pub nodes: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
pub struct RegisterNodesResponse {
    pub message: String,
    pub total_nodes: Vec<PeerAddress>,
}

#[derive(Serialize, Deserialize)]
pub struct ResolveResponse {
    pub message: String,
    pub replaced: bool,
    pub chain: Vec<Block>,
    pub length: usize,
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

/// Build the router with all endpoints.
pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        .route("/mine", get(mine))
        .route("/transactions/new", post(new_transaction))
        .route("/chain", get(full_chain))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve_conflicts))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors)
        .with_state(node)
}

/// Serve the API on `addr` until the process is stopped.
pub async fn run_api_server(node: Arc<Node>, addr: SocketAddr) -> Result<(), ChainError> {
    let app = build_api_router(node);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "node_id": node.node_id(),
        "difficulty_target": node.difficulty().target(),
        "blocks_mined": node.blocks_mined(),
        "peers": node.peers().len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn mine(State(node): State<Arc<Node>>) -> Result<Json<MineResponse>, ApiError> {
    let block = node.mine().await?;
    Ok(Json(MineResponse {
        message: "New Block Forged".to_string(),
        index: block.index,
        transactions: block.transactions,
        proof: block.proof,
        previous_hash: block.previous_hash,
    }))
}

async fn new_transaction(
    State(node): State<Arc<Node>>,
    payload: Result<Json<NewTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let Json(request) = payload?;
    let index = node.submit_transaction(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", index),
            index,
        }),
    ))
}

async fn full_chain(State(node): State<Arc<Node>>) -> Json<ChainResponse> {
    let chain = node.chain().await;
    let length = chain.len();
    Json(ChainResponse { chain, length })
}

async fn register_nodes(
    State(node): State<Arc<Node>>,
    payload: Result<Json<RegisterNodesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterNodesResponse>), ApiError> {
    let Json(request) = payload?;
    let nodes = request
        .nodes
        .filter(|nodes| !nodes.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("Please supply a valid list of nodes".to_string()))?;

    let total_nodes = node.register_peers(nodes.as_slice())?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterNodesResponse {
            message: "New nodes have been added".to_string(),
            total_nodes,
        }),
    ))
}

async fn resolve_conflicts(State(node): State<Arc<Node>>) -> Result<Json<ResolveResponse>, ApiError> {
    let resolution = node.resolve().await?;
    let message = if resolution.replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };
    let length = resolution.chain.len();
    Ok(Json(ResolveResponse {
        message: message.to_string(),
        replaced: resolution.replaced,
        chain: resolution.chain,
        length,
    }))
}
