//! HTTP request handlers.
//!
//! Every handler follows the same shape: lock the engine, run one operation,
//! drop the lock, then push the returned actions into the outbox for the
//! fabric dispatcher. No handler awaits while holding the lock.

use super::types::*;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chaosledger_engine::{
    Action, AggregateAnnouncement, EngineError, EngineState, EntropyContribution,
    LeaderAnnouncement, VerdictAnnouncement,
};
use chaosledger_types::Block;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::warn;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The cluster-local mutex over the whole engine.
    pub engine: Arc<Mutex<EngineState>>,

    /// Channel to the fabric dispatcher.
    pub outbox: mpsc::Sender<Action>,

    /// Peer base URLs, for `/peers`.
    pub peer_urls: Arc<Vec<String>>,

    /// Server start time, for `/status` uptime.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        engine: Arc<Mutex<EngineState>>,
        outbox: mpsc::Sender<Action>,
        peer_urls: Vec<String>,
    ) -> Self {
        Self {
            engine,
            outbox,
            peer_urls: Arc::new(peer_urls),
            start_time: Instant::now(),
        }
    }

    /// Hand actions to the dispatcher. Errors only when shutting down.
    async fn dispatch(&self, actions: Vec<Action>) {
        for action in actions {
            if self.outbox.send(action).await.is_err() {
                warn!("Outbox closed, action dropped");
                return;
            }
        }
    }
}

/// Map an engine error onto its HTTP reply.
fn error_response(err: EngineError) -> Response {
    let status = match err {
        EngineError::NotLeader => StatusCode::FORBIDDEN,
        _ if err.is_request_scoped() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Seconds since the epoch as f64, the block timestamp format.
fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ═══════════════════════════════════════════════════════════════════════════
// Admission API
// ═══════════════════════════════════════════════════════════════════════════

/// `POST /add_transaction`
pub async fn add_transaction(
    State(state): State<AppState>,
    Json(request): Json<AddTransactionRequest>,
) -> Response {
    let result = {
        let mut engine = state.engine.lock();
        engine.admit_transaction(request.transaction)
    };
    match result {
        Ok((_, actions)) => {
            state.dispatch(actions).await;
            Json(MessageResponse::new(
                "Transaction added and broadcast successfully",
            ))
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `GET /transaction_pool`
pub async fn transaction_pool(State(state): State<AppState>) -> Response {
    let pool = state.engine.lock().chain().mempool.entries().to_vec();
    Json(TransactionPoolResponse {
        transaction_pool: pool,
    })
    .into_response()
}

/// `GET /peers`
pub async fn peers(State(state): State<AppState>) -> Response {
    Json(PeersResponse {
        peers: state.peer_urls.as_ref().clone(),
    })
    .into_response()
}

/// `GET /blockchain`
pub async fn blockchain(State(state): State<AppState>) -> Response {
    let chain = state.engine.lock().chain().blocks().to_vec();
    Json(chain).into_response()
}

// ═══════════════════════════════════════════════════════════════════════════
// Leader view
// ═══════════════════════════════════════════════════════════════════════════

/// `GET /get_leader`
pub async fn get_leader(State(state): State<AppState>) -> Response {
    let leader = state.engine.lock().leader_id().cloned();
    Json(LeaderResponse { leader }).into_response()
}

/// `POST /set_leader`
pub async fn set_leader(
    State(state): State<AppState>,
    Json(request): Json<LeaderAnnouncement>,
) -> Response {
    let leader = request.leader_id.clone();
    state.engine.lock().set_leader(request.leader_id);
    Json(MessageResponse::new(format!("Leader updated to {leader}"))).into_response()
}

/// `POST /elect_leader`
pub async fn elect_leader(
    State(state): State<AppState>,
    Json(request): Json<ElectLeaderRequest>,
) -> Response {
    let new_leader = request.new_leader_id.clone();
    let result = {
        let mut engine = state.engine.lock();
        engine.elect_leader(request.new_leader_id)
    };
    match result {
        Ok(actions) => {
            state.dispatch(actions).await;
            Json(MessageResponse::new(format!("Leader changed to {new_leader}"))).into_response()
        }
        Err(err) => error_response(err),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Entropy round
// ═══════════════════════════════════════════════════════════════════════════

/// `POST /send_entropy`
pub async fn send_entropy(State(state): State<AppState>) -> Response {
    let result = {
        let mut engine = state.engine.lock();
        engine.generate_and_send_entropy()
    };
    match result {
        Ok((entropy, actions)) => {
            state.dispatch(actions).await;
            Json(EntropySentResponse {
                message: "Entropy generated and sent to leader".to_string(),
                entropy,
            })
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /receive_entropy`
pub async fn receive_entropy(
    State(state): State<AppState>,
    Json(contribution): Json<EntropyContribution>,
) -> Response {
    let from = contribution.node_id.clone();
    let result = {
        let mut engine = state.engine.lock();
        engine.receive_contribution(contribution)
    };
    match result {
        Ok(()) => Json(MessageResponse::new(format!("Entropy from {from} received"))).into_response(),
        Err(err) => error_response(err),
    }
}

/// `POST /aggregate_entropy`
pub async fn aggregate_entropy(State(state): State<AppState>) -> Response {
    let result = {
        let mut engine = state.engine.lock();
        engine.aggregate_and_elect()
    };
    match result {
        Ok((_, next_leader, actions)) => {
            state.dispatch(actions).await;
            Json(AggregateResponse {
                message: "Aggregate entropy calculated and leader elected".to_string(),
                next_leader,
            })
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /receive_aggregate_entropy`
pub async fn receive_aggregate_entropy(
    State(state): State<AppState>,
    Json(announcement): Json<AggregateAnnouncement>,
) -> Response {
    let result = {
        let mut engine = state.engine.lock();
        engine.apply_aggregate(announcement)
    };
    match result {
        Ok(()) => Json(MessageResponse::new("Aggregate entropy and leader updated")).into_response(),
        Err(err) => error_response(err),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Blocks
// ═══════════════════════════════════════════════════════════════════════════

/// `POST /propose_block`
pub async fn propose_block(State(state): State<AppState>) -> Response {
    let result = {
        let mut engine = state.engine.lock();
        engine.propose_block(now_timestamp())
    };
    match result {
        Ok((block, actions)) => {
            state.dispatch(actions).await;
            Json(ProposeResponse {
                message: "Block proposed and broadcast".to_string(),
                block,
            })
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /receive_proposed_block`
///
/// Validation failure is a verdict, not a request error: this returns 200
/// with `status: "invalid"` for a block that does not check out.
pub async fn receive_proposed_block(
    State(state): State<AppState>,
    Json(block): Json<Block>,
) -> Response {
    let (verdict, actions) = {
        let mut engine = state.engine.lock();
        engine.receive_proposal(block)
    };
    state.dispatch(actions).await;
    Json(ProposalProcessedResponse {
        message: "Proposed block processed".to_string(),
        status: verdict,
    })
    .into_response()
}

/// `POST /validate_block`
pub async fn validate_block(
    State(state): State<AppState>,
    Json(announcement): Json<VerdictAnnouncement>,
) -> Response {
    let (outcome, actions) = {
        let mut engine = state.engine.lock();
        engine.record_verdict(announcement)
    };
    state.dispatch(actions).await;
    Json(MessageResponse::new(outcome.message())).into_response()
}

/// `POST /blockchain_update`
pub async fn blockchain_update(
    State(state): State<AppState>,
    Json(block): Json<Block>,
) -> Response {
    let result = {
        let mut engine = state.engine.lock();
        engine.apply_chain_update(block)
    };
    match result {
        Ok(true) => Json(MessageResponse::new("Blockchain updated")).into_response(),
        Ok(false) => Json(MessageResponse::new("Block already known")).into_response(),
        Err(err) => error_response(err),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Probes
// ═══════════════════════════════════════════════════════════════════════════

/// `GET /health`
pub async fn health() -> Response {
    Json(HealthResponse::default()).into_response()
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Response {
    let (node_id, leader, is_leader, chain_height, mempool_size, reputation) = {
        let engine = state.engine.lock();
        (
            engine.node_id().clone(),
            engine.leader_id().cloned(),
            engine.is_leader(),
            engine.chain().len(),
            engine.chain().mempool.len(),
            engine.reputation(),
        )
    };
    Json(StatusResponse {
        node_id,
        leader,
        is_leader,
        chain_height,
        mempool_size,
        reputation,
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .into_response()
}
