//! Typed peer messages and their wire mapping.
//!
//! Every inter-replica message is one variant of [`PeerMessage`]; the node
//! shell maps a variant to its HTTP endpoint and JSON body through
//! [`PeerMessage::endpoint`] and [`PeerMessage::body`], keeping the wire
//! contract at a single site.

use crate::round::Verdict;
use chaosledger_types::{Block, NodeId, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A follower's entropy contribution, unicast to the leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntropyContribution {
    pub node_id: NodeId,
    pub entropy: String,
}

/// The leader's aggregate plus the next leader it elected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateAnnouncement {
    pub aggregate_entropy: String,
    pub next_leader: NodeId,
}

/// A replica's verdict on a proposed block, carrying the block data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictAnnouncement {
    pub block_index: u64,
    pub node_id: NodeId,
    pub status: Verdict,
    pub block_data: Block,
}

/// Leader view update (bootstrap and gossip).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderAnnouncement {
    pub leader_id: NodeId,
}

/// All messages a replica can send to a peer.
#[derive(Debug, Clone)]
pub enum PeerMessage {
    /// Gossip a newly admitted transaction.
    NewTransaction(Transaction),

    /// Entropy contribution (follower to leader).
    ReceiveEntropy(EntropyContribution),

    /// Aggregate entropy and next leader (leader to all).
    BroadcastAggregate(AggregateAnnouncement),

    /// Candidate block (leader to all).
    ProposeBlock(Block),

    /// Validation verdict (all to all).
    BlockValidation(VerdictAnnouncement),

    /// Committed block notification (any to all).
    BlockchainUpdate(Block),

    /// Leader view update (bootstrap only).
    SetLeader(LeaderAnnouncement),
}

impl PeerMessage {
    /// The message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::NewTransaction(_) => "new_transaction",
            PeerMessage::ReceiveEntropy(_) => "receive_entropy",
            PeerMessage::BroadcastAggregate(_) => "broadcast_aggregate_entropy",
            PeerMessage::ProposeBlock(_) => "propose_block",
            PeerMessage::BlockValidation(_) => "block_validation",
            PeerMessage::BlockchainUpdate(_) => "blockchain_update",
            PeerMessage::SetLeader(_) => "set_leader",
        }
    }

    /// The receiving endpoint on the peer.
    pub fn endpoint(&self) -> &'static str {
        match self {
            PeerMessage::NewTransaction(_) => "/add_transaction",
            PeerMessage::ReceiveEntropy(_) => "/receive_entropy",
            PeerMessage::BroadcastAggregate(_) => "/receive_aggregate_entropy",
            PeerMessage::ProposeBlock(_) => "/receive_proposed_block",
            PeerMessage::BlockValidation(_) => "/validate_block",
            PeerMessage::BlockchainUpdate(_) => "/blockchain_update",
            PeerMessage::SetLeader(_) => "/set_leader",
        }
    }

    /// The JSON body posted to [`Self::endpoint`].
    pub fn body(&self) -> serde_json::Value {
        match self {
            PeerMessage::NewTransaction(tx) => json!({ "transaction": tx }),
            PeerMessage::ReceiveEntropy(c) => json!(c),
            PeerMessage::BroadcastAggregate(a) => json!(a),
            PeerMessage::ProposeBlock(block) => json!(block),
            PeerMessage::BlockValidation(v) => json!(v),
            PeerMessage::BlockchainUpdate(block) => json!(block),
            PeerMessage::SetLeader(l) => json!(l),
        }
    }
}
