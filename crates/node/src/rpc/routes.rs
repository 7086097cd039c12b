//! Route configuration.

use super::handlers::{self, AppState};
use axum::{
    routing::{get, post},
    Router,
};

/// The full router: admission API, peer fabric endpoints, and probes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Admission API
        .route("/add_transaction", post(handlers::add_transaction))
        .route("/transaction_pool", get(handlers::transaction_pool))
        .route("/peers", get(handlers::peers))
        .route("/blockchain", get(handlers::blockchain))
        // Leader view
        .route("/get_leader", get(handlers::get_leader))
        .route("/set_leader", post(handlers::set_leader))
        .route("/elect_leader", post(handlers::elect_leader))
        // Entropy round
        .route("/send_entropy", post(handlers::send_entropy))
        .route("/receive_entropy", post(handlers::receive_entropy))
        .route("/aggregate_entropy", post(handlers::aggregate_entropy))
        .route(
            "/receive_aggregate_entropy",
            post(handlers::receive_aggregate_entropy),
        )
        // Blocks
        .route("/propose_block", post(handlers::propose_block))
        .route(
            "/receive_proposed_block",
            post(handlers::receive_proposed_block),
        )
        .route("/validate_block", post(handlers::validate_block))
        .route("/blockchain_update", post(handlers::blockchain_update))
        // Probes
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .with_state(state)
}
