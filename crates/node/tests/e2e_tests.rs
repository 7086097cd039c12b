//! Router-level tests driving the HTTP surface with `oneshot` requests.
//!
//! A single replica with an empty peer set is a one-node cluster: with
//! `include_own_entropy` enabled it can run complete rounds through the
//! HTTP surface alone, which is what the full-round test exploits.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chaosledger_engine::{Action, EngineConfig, EngineState, Verdict};
use chaosledger_node::{create_router, AppState};
use chaosledger_types::{Block, NodeId, DEFAULT_GENESIS_TIMESTAMP};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

struct TestReplica {
    router: Router,
    engine: Arc<Mutex<EngineState>>,
    // Keeps the outbox open so dispatch never errors.
    _outbox_rx: mpsc::Receiver<Action>,
}

fn replica(node: &str, peers: &[&str], config: EngineConfig) -> TestReplica {
    let engine = EngineState::new(
        node.into(),
        peers.iter().map(|p| NodeId::from(*p)).collect(),
        Block::genesis(DEFAULT_GENESIS_TIMESTAMP),
        config,
    )
    .unwrap();
    let engine = Arc::new(Mutex::new(engine));
    let (outbox, outbox_rx) = mpsc::channel(64);
    let state = AppState::new(
        Arc::clone(&engine),
        outbox,
        peers.iter().map(|p| format!("http://{p}:5000")).collect(),
    );
    TestReplica {
        router: create_router(state),
        engine,
        _outbox_rx: outbox_rx,
    }
}

async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn post(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn post_empty(router: &Router, path: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let replica = replica("node1", &["node2"], EngineConfig::default());
    let (status, body) = get(&replica.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn status_reports_the_node_view() {
    let replica = replica("node1", &["node2", "node3"], EngineConfig::default());
    let (status, body) = get(&replica.router, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_id"], "node1");
    assert_eq!(body["leader"], Value::Null);
    assert_eq!(body["is_leader"], false);
    assert_eq!(body["chain_height"], 1);
    assert_eq!(body["mempool_size"], 0);
    assert_eq!(body["reputation"], 50);
}

#[tokio::test]
async fn duplicate_transactions_pool_once() {
    let replica = replica("node1", &["node2"], EngineConfig::default());
    let tx = json!({"transaction": {"id": "t1", "data": "x"}});

    let (status, _) = post(&replica.router, "/add_transaction", tx.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&replica.router, "/add_transaction", tx).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&replica.router, "/transaction_pool").await;
    assert_eq!(body["transaction_pool"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_transactions_are_rejected() {
    let replica = replica("node1", &["node2"], EngineConfig::default());
    let (status, body) = post(
        &replica.router,
        "/add_transaction",
        json!({"transaction": {"id": "t1"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn blockchain_starts_at_genesis() {
    let replica = replica("node1", &["node2"], EngineConfig::default());
    let (status, body) = get(&replica.router, "/blockchain").await;
    assert_eq!(status, StatusCode::OK);
    let chain = body.as_array().unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0]["index"], 0);
    assert_eq!(chain[0]["previous_hash"], "0");
}

#[tokio::test]
async fn peers_lists_configured_urls() {
    let replica = replica("node1", &["node2", "node3"], EngineConfig::default());
    let (status, body) = get(&replica.router, "/peers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["peers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn leader_view_round_trips() {
    let replica = replica("node1", &["node2"], EngineConfig::default());

    let (_, body) = get(&replica.router, "/get_leader").await;
    assert_eq!(body["leader"], Value::Null);

    let (status, _) = post(
        &replica.router,
        "/set_leader",
        json!({"leader_id": "node2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&replica.router, "/get_leader").await;
    assert_eq!(body["leader"], "node2");
}

#[tokio::test]
async fn non_leader_cannot_propose() {
    let replica = replica("node2", &["node1"], EngineConfig::default());
    replica.engine.lock().set_leader("node1".into());

    let (status, body) = post_empty(&replica.router, "/propose_block").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("not the leader"));
}

#[tokio::test]
async fn non_leader_cannot_elect_or_aggregate_or_receive_entropy() {
    let replica = replica("node2", &["node1"], EngineConfig::default());
    replica.engine.lock().set_leader("node1".into());

    let (status, _) = post(
        &replica.router,
        "/elect_leader",
        json!({"new_leader_id": "node2"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post_empty(&replica.router, "/aggregate_entropy").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        &replica.router,
        "/receive_entropy",
        json!({"node_id": "node1", "entropy": "0.5_0.1"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn the_leader_cannot_send_entropy() {
    let replica = replica("node1", &["node2"], EngineConfig::default());
    replica.engine.lock().set_leader("node1".into());

    let (status, _) = post_empty(&replica.router, "/send_entropy").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn aggregation_without_contributions_is_a_client_error() {
    let replica = replica("node1", &["node2"], EngineConfig::default());
    replica.engine.lock().set_leader("node1".into());

    let (status, body) = post_empty(&replica.router, "/aggregate_entropy").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("contributions"));

    // The leader did not change.
    let (_, body) = get(&replica.router, "/get_leader").await;
    assert_eq!(body["leader"], "node1");
}

#[tokio::test]
async fn tampered_proposals_get_an_invalid_verdict() {
    let replica = replica("node2", &["node1"], EngineConfig::default());
    replica.engine.lock().set_leader("node1".into());
    post(
        &replica.router,
        "/add_transaction",
        json!({"transaction": {"id": "t1", "data": "x"}}),
    )
    .await;

    let tip_hash = replica.engine.lock().chain().tip().hash.clone();
    let mut forged = serde_json::to_value(Block::new(
        1,
        tip_hash,
        vec![serde_json::from_value(json!({"id": "t1", "data": "x"})).unwrap()],
        "42.000000",
        1_000.0,
    ))
    .unwrap();
    forged["hash"] = json!("0".repeat(64));

    let (status, body) = post(&replica.router, "/receive_proposed_block", forged).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "invalid");

    let (_, body) = get(&replica.router, "/blockchain").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn single_replica_runs_a_full_round() {
    // A one-node cluster with include_own_entropy can drive a complete
    // round through the HTTP surface alone.
    let replica = replica(
        "node1",
        &[],
        EngineConfig::default().with_include_own_entropy(true),
    );
    replica.engine.lock().set_leader("node1".into());

    for id in ["t1", "t2", "t3"] {
        let (status, _) = post(
            &replica.router,
            "/add_transaction",
            json!({"transaction": {"id": id, "data": "x"}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = post_empty(&replica.router, "/aggregate_entropy").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["next_leader"], "node1");

    // k = 1: the proposer's own verdict is already a strict majority.
    let (status, body) = post_empty(&replica.router, "/propose_block").await;
    assert_eq!(status, StatusCode::OK);
    let proposed = body["block"].clone();

    let (_, body) = get(&replica.router, "/blockchain").await;
    let chain = body.as_array().unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1]["hash"], proposed["hash"]);
    assert_eq!(chain[1]["transactions"].as_array().unwrap().len(), 3);

    // The mempool drained into the block.
    let (_, body) = get(&replica.router, "/transaction_pool").await;
    assert!(body["transaction_pool"].as_array().unwrap().is_empty());

    // Replaying a verdict for the committed index is an idempotent no-op.
    let (status, body) = post(
        &replica.router,
        "/validate_block",
        json!({
            "block_index": 1,
            "node_id": "node9",
            "status": "valid",
            "block_data": proposed,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Block already processed");

    let (_, body) = get(&replica.router, "/blockchain").await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_mempool_cannot_propose() {
    let replica = replica(
        "node1",
        &[],
        EngineConfig::default().with_include_own_entropy(true),
    );
    replica.engine.lock().set_leader("node1".into());
    post_empty(&replica.router, "/aggregate_entropy").await;

    let (status, body) = post_empty(&replica.router, "/propose_block").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("transactions"));
}

#[tokio::test]
async fn chain_updates_apply_idempotently() {
    // Build a committed block on a source replica, then feed it to another
    // replica twice via /blockchain_update.
    let source = replica(
        "node1",
        &[],
        EngineConfig::default().with_include_own_entropy(true),
    );
    source.engine.lock().set_leader("node1".into());
    post(
        &source.router,
        "/add_transaction",
        json!({"transaction": {"id": "t1", "data": "x"}}),
    )
    .await;
    post_empty(&source.router, "/aggregate_entropy").await;
    let (_, body) = post_empty(&source.router, "/propose_block").await;
    let block = body["block"].clone();

    let target = replica("node2", &["node1"], EngineConfig::default());
    let (status, body) = post(&target.router, "/blockchain_update", block.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Blockchain updated");

    let (status, body) = post(&target.router, "/blockchain_update", block).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Block already known");

    let (_, body) = get(&target.router, "/blockchain").await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn verdict_serialization_matches_the_wire() {
    // The verdict strings on the wire are exactly "valid" / "invalid".
    assert_eq!(serde_json::to_value(Verdict::Valid).unwrap(), json!("valid"));
    assert_eq!(
        serde_json::to_value(Verdict::Invalid).unwrap(),
        json!("invalid")
    );
}

#[tokio::test]
async fn genesis_mismatch_refuses_to_boot() {
    // A replica configured with a different genesis timestamp computes a
    // different hash and must fail before serving.
    let expected = Block::genesis(DEFAULT_GENESIS_TIMESTAMP).hash;
    let drifted = Block::genesis(DEFAULT_GENESIS_TIMESTAMP + 1.0);
    let err = chaosledger_engine::verify_genesis(&drifted, Some(&expected)).unwrap_err();
    assert!(matches!(
        err,
        chaosledger_engine::EngineError::GenesisMismatch(_)
    ));
}
