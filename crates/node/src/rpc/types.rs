//! Request and response types for the HTTP API.

use chaosledger_types::{NodeId, Transaction};
use serde::{Deserialize, Serialize};

/// Generic success reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Generic error reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Body of `POST /add_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTransactionRequest {
    pub transaction: Transaction,
}

/// Body of `POST /elect_leader`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectLeaderRequest {
    pub new_leader_id: NodeId,
}

/// Reply of `GET /transaction_pool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPoolResponse {
    pub transaction_pool: Vec<Transaction>,
}

/// Reply of `GET /peers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

/// Reply of `GET /get_leader`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderResponse {
    pub leader: Option<NodeId>,
}

/// Reply of `POST /send_entropy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntropySentResponse {
    pub message: String,
    pub entropy: String,
}

/// Reply of `POST /aggregate_entropy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub message: String,
    pub next_leader: NodeId,
}

/// Reply of `POST /propose_block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeResponse {
    pub message: String,
    pub block: chaosledger_types::Block,
}

/// Reply of `POST /receive_proposed_block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalProcessedResponse {
    pub message: String,
    pub status: chaosledger_engine::Verdict,
}

/// Reply of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Reply of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: NodeId,
    pub leader: Option<NodeId>,
    pub is_leader: bool,
    pub chain_height: u64,
    pub mempool_size: usize,
    pub reputation: i64,
    pub uptime_secs: u64,
    pub version: String,
}
