//! The round coordinator state machine.
//!
//! [`EngineState`] owns the chain store, the mempool, the leader view, and
//! the per-round state. Every operation runs synchronously under the node's
//! single mutex and returns the outbound [`Action`]s for the caller to
//! execute after unlocking.

use crate::action::Action;
use crate::builder;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::message::{
    AggregateAnnouncement, EntropyContribution, LeaderAnnouncement, PeerMessage,
    VerdictAnnouncement,
};
use crate::round::{RoundState, Verdict};
use chaosledger_chain::ChainStore;
use chaosledger_types::{Block, NodeId, Transaction};
use tracing::{debug, info, warn};

/// Starting reputation score of a replica.
const INITIAL_REPUTATION: i64 = 50;

/// Terminal result of feeding a verdict into the tally.
#[derive(Debug, Clone, PartialEq)]
pub enum TallyOutcome {
    /// A strict majority validated the block; it is now on the chain.
    Committed(Block),
    /// A strict majority rejected the block (or the commit could not apply).
    Rejected,
    /// Not enough verdicts yet.
    Pending,
    /// The block index already reached a terminal outcome earlier.
    AlreadyProcessed,
}

impl TallyOutcome {
    /// Human-readable reply for the admission API.
    pub fn message(&self) -> &'static str {
        match self {
            TallyOutcome::Committed(_) => "Block added to blockchain",
            TallyOutcome::Rejected => "Block rejected",
            TallyOutcome::Pending => "Waiting for more responses",
            TallyOutcome::AlreadyProcessed => "Block already processed",
        }
    }
}

/// Per-replica consensus engine.
pub struct EngineState {
    /// This replica's identity.
    node_id: NodeId,

    /// The other replicas of the cluster.
    peers: Vec<NodeId>,

    /// Current leader view; `None` until bootstrap announces one.
    leader_id: Option<NodeId>,

    /// This replica's entropy sample for the current round.
    local_entropy: Option<String>,

    /// The last aggregate entropy seen (ordering seed for the next block).
    aggregate: Option<String>,

    /// The accepted chain and the mempool.
    chain: ChainStore,

    /// Round-scoped state.
    round: RoundState,

    /// Informational reputation score (never consulted by consensus).
    reputation: i64,

    config: EngineConfig,
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState")
            .field("node_id", &self.node_id)
            .field("leader_id", &self.leader_id)
            .field("chain_height", &self.chain.len())
            .field("mempool_size", &self.chain.mempool.len())
            .finish()
    }
}

impl EngineState {
    /// Create an engine starting from the agreed genesis block.
    pub fn new(
        node_id: NodeId,
        peers: Vec<NodeId>,
        genesis: Block,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let chain = ChainStore::new(genesis)?;
        Ok(Self {
            node_id,
            peers,
            leader_id: None,
            local_entropy: None,
            aggregate: None,
            chain,
            round: RoundState::default(),
            reputation: INITIAL_REPUTATION,
            config,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    pub fn leader_id(&self) -> Option<&NodeId> {
        self.leader_id.as_ref()
    }

    pub fn is_leader(&self) -> bool {
        self.leader_id.as_ref() == Some(&self.node_id)
    }

    /// Cluster size k (peers plus this replica).
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    pub fn chain(&self) -> &ChainStore {
        &self.chain
    }

    pub fn aggregate(&self) -> Option<&str> {
        self.aggregate.as_deref()
    }

    pub fn reputation(&self) -> i64 {
        self.reputation
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transactions
    // ═══════════════════════════════════════════════════════════════════════

    /// Admit a transaction into the mempool.
    ///
    /// Returns whether the transaction was newly admitted; duplicates are
    /// idempotent no-ops. A newly admitted transaction is gossiped to every
    /// peer, so flood propagation converges once all replicas hold it.
    pub fn admit_transaction(
        &mut self,
        tx: Transaction,
    ) -> Result<(bool, Vec<Action>), EngineError> {
        if !tx.is_admissible() {
            return Err(EngineError::MalformedRequest(
                "transaction must carry a string id and a data field".to_string(),
            ));
        }

        let admitted = self.chain.mempool.submit(tx.clone());
        if !admitted {
            return Ok((false, Vec::new()));
        }

        info!(
            tx_id = tx.id().unwrap_or_default(),
            pool_size = self.chain.mempool.len(),
            "Transaction admitted to mempool"
        );
        let actions = vec![Action::Broadcast {
            message: PeerMessage::NewTransaction(tx),
        }];
        Ok((true, actions))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Leader view
    // ═══════════════════════════════════════════════════════════════════════

    /// Unconditionally set the local leader view (bootstrap and gossip).
    pub fn set_leader(&mut self, leader_id: NodeId) {
        if self.leader_id.as_ref() != Some(&leader_id) {
            info!(leader = %leader_id, "Leader view updated");
        }
        self.leader_id = Some(leader_id);
    }

    /// Leader-only: hand leadership to another replica and announce it.
    pub fn elect_leader(&mut self, new_leader: NodeId) -> Result<Vec<Action>, EngineError> {
        if !self.is_leader() {
            return Err(EngineError::NotLeader);
        }
        self.set_leader(new_leader.clone());
        Ok(vec![Action::Broadcast {
            message: PeerMessage::SetLeader(LeaderAnnouncement {
                leader_id: new_leader,
            }),
        }])
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Entropy
    // ═══════════════════════════════════════════════════════════════════════

    /// Generate this round's entropy sample and unicast it to the leader.
    ///
    /// The leader itself must not call this; its participation is governed
    /// by `include_own_entropy` at aggregation time.
    pub fn generate_and_send_entropy(&mut self) -> Result<(String, Vec<Action>), EngineError> {
        if self.is_leader() {
            return Err(EngineError::MalformedRequest(
                "the leader does not send entropy to itself".to_string(),
            ));
        }
        let Some(leader) = self.leader_id.clone() else {
            return Err(EngineError::MalformedRequest(
                "no leader known yet".to_string(),
            ));
        };

        let sample = chaosledger_entropy::generate_sample();
        self.local_entropy = Some(sample.clone());
        debug!(sample = %sample, leader = %leader, "Entropy generated, sending to leader");

        let actions = vec![Action::Unicast {
            to: leader,
            message: PeerMessage::ReceiveEntropy(EntropyContribution {
                node_id: self.node_id.clone(),
                entropy: sample.clone(),
            }),
        }];
        Ok((sample, actions))
    }

    /// Leader-only: record a follower's contribution.
    pub fn receive_contribution(
        &mut self,
        contribution: EntropyContribution,
    ) -> Result<(), EngineError> {
        if !self.is_leader() {
            return Err(EngineError::NotLeader);
        }
        if !chaosledger_entropy::is_well_formed(&contribution.entropy) {
            return Err(EngineError::BadEntropy(format!(
                "sample {:?} is outside the Henon bounds",
                contribution.entropy
            )));
        }
        info!(
            from = %contribution.node_id,
            sample = %contribution.entropy,
            "Contribution recorded"
        );
        self.round
            .contributions
            .insert(contribution.node_id, contribution.entropy);
        Ok(())
    }

    /// Leader-only: fuse the round's contributions, elect the next leader,
    /// and broadcast both. Consumes the contributions.
    pub fn aggregate_and_elect(&mut self) -> Result<(String, NodeId, Vec<Action>), EngineError> {
        if !self.is_leader() {
            return Err(EngineError::NotLeader);
        }

        if self.config.include_own_entropy {
            let sample = self
                .local_entropy
                .take()
                .unwrap_or_else(chaosledger_entropy::generate_sample);
            self.round
                .contributions
                .insert(self.node_id.clone(), sample);
        }

        if self.round.contributions.is_empty() {
            return Err(EngineError::NoContributions);
        }

        let weights = (!self.config.weights.is_empty()).then_some(&self.config.weights);
        let fused = chaosledger_entropy::fuse(&self.round.contributions, weights);
        let aggregate = chaosledger_entropy::format_aggregate(fused);

        let next_leader = chaosledger_entropy::closest_contributor(
            &self.round.contributions,
            &aggregate,
        )
        .ok_or(EngineError::NoContributions)?;

        info!(
            aggregate = %aggregate,
            next_leader = %next_leader,
            contributors = self.round.contributions.len(),
            "Aggregate computed, next leader elected"
        );

        // Contributions are consumed by the round.
        self.round.contributions.clear();
        self.local_entropy = None;
        self.aggregate = Some(aggregate.clone());
        self.set_leader(next_leader.clone());

        let actions = vec![Action::Broadcast {
            message: PeerMessage::BroadcastAggregate(AggregateAnnouncement {
                aggregate_entropy: aggregate.clone(),
                next_leader: next_leader.clone(),
            }),
        }];
        Ok((aggregate, next_leader, actions))
    }

    /// Mirror a broadcast aggregate and leader update locally.
    pub fn apply_aggregate(
        &mut self,
        announcement: AggregateAnnouncement,
    ) -> Result<(), EngineError> {
        builder::normalize_entropy(&announcement.aggregate_entropy)?;
        debug!(
            aggregate = %announcement.aggregate_entropy,
            next_leader = %announcement.next_leader,
            "Aggregate received"
        );
        self.aggregate = Some(announcement.aggregate_entropy);
        self.local_entropy = None;
        self.set_leader(announcement.next_leader);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Proposal and validation
    // ═══════════════════════════════════════════════════════════════════════

    /// Leader-only: build the next block from the mempool and broadcast it.
    ///
    /// The proposal itself counts as the proposer's `valid` verdict, so in a
    /// single-replica cluster the block commits immediately.
    pub fn propose_block(&mut self, now: f64) -> Result<(Block, Vec<Action>), EngineError> {
        if !self.is_leader() {
            return Err(EngineError::NotLeader);
        }
        let aggregate = self
            .aggregate
            .clone()
            .ok_or_else(|| EngineError::BadEntropy("no aggregate entropy this round".to_string()))?;
        // The block carries the six-decimal normal form.
        let aggregate = builder::normalize_entropy(&aggregate)?;

        let snapshot = self.chain.mempool.take(self.config.max_block_transactions);
        if snapshot.is_empty() {
            return Err(EngineError::NoTransactions);
        }

        let ordered = builder::reorder(&snapshot, &aggregate)?;
        let block = Block::new(
            self.chain.len(),
            self.chain.tip().hash.clone(),
            ordered,
            aggregate,
            now,
        );
        info!(
            index = block.index,
            hash = %block.hash,
            tx_count = block.transactions.len(),
            "Block proposed"
        );

        self.round.pending_block = Some(block.clone());
        self.round.proposed.insert(block.index);
        self.round.record_verdict(
            block.index,
            self.node_id.clone(),
            Verdict::Valid,
            block.clone(),
        );

        let mut actions = vec![Action::Broadcast {
            message: PeerMessage::ProposeBlock(block.clone()),
        }];
        let (_, settle_actions) = self.settle(block.index);
        actions.extend(settle_actions);

        Ok((block, actions))
    }

    /// Validate a block proposed by the leader and broadcast the verdict.
    ///
    /// The proposal is also recorded as the proposer's implicit `valid`
    /// verdict. Validation failure is a verdict, not a request error.
    pub fn receive_proposal(&mut self, block: Block) -> (Verdict, Vec<Action>) {
        let snapshot = self.chain.mempool.take(self.config.max_block_transactions);
        let verdict = match builder::validate_block(&block, &snapshot, &self.chain.tip().hash) {
            Ok(()) => Verdict::Valid,
            Err(reason) => {
                warn!(index = block.index, %reason, "Proposed block failed validation");
                Verdict::Invalid
            }
        };
        info!(index = block.index, verdict = %verdict, "Proposed block processed");

        self.round.pending_block = Some(block.clone());

        // The proposer's own verdict is implicit in the proposal.
        if let Some(proposer) = self.leader_id.clone() {
            if proposer != self.node_id {
                self.round
                    .record_verdict(block.index, proposer, Verdict::Valid, block.clone());
            }
        }
        self.round.record_verdict(
            block.index,
            self.node_id.clone(),
            verdict,
            block.clone(),
        );

        let mut actions = vec![Action::Broadcast {
            message: PeerMessage::BlockValidation(VerdictAnnouncement {
                block_index: block.index,
                node_id: self.node_id.clone(),
                status: verdict,
                block_data: block.clone(),
            }),
        }];
        let (_, settle_actions) = self.settle(block.index);
        actions.extend(settle_actions);

        (verdict, actions)
    }

    /// Tally a verdict from a peer; commit or reject on strict majority.
    ///
    /// Replays for an already-processed index are silently dropped.
    pub fn record_verdict(
        &mut self,
        announcement: VerdictAnnouncement,
    ) -> (TallyOutcome, Vec<Action>) {
        let index = announcement.block_index;
        if self.round.is_processed(index) {
            debug!(index, from = %announcement.node_id, "Verdict for processed block ignored");
            return (TallyOutcome::AlreadyProcessed, Vec::new());
        }

        self.round.record_verdict(
            index,
            announcement.node_id,
            announcement.status,
            announcement.block_data,
        );
        self.settle(index)
    }

    /// Accept a committed block announced by a peer. Idempotent.
    pub fn apply_chain_update(&mut self, block: Block) -> Result<bool, EngineError> {
        if self.chain.contains(&block) {
            debug!(index = block.index, "Chain update already applied");
            return Ok(false);
        }
        let index = block.index;
        self.chain.append(block)?;
        self.round.mark_processed(index);
        self.round.pending_block = None;
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tally settlement
    // ═══════════════════════════════════════════════════════════════════════

    /// Check the tally for `index` against the strict-majority threshold and
    /// apply the terminal outcome if one is reached.
    fn settle(&mut self, index: u64) -> (TallyOutcome, Vec<Action>) {
        let k = self.cluster_size();
        let (valid, invalid) = self.round.counts(index);

        if valid * 2 > k {
            let own_verdict = self.round.verdict_of(index, &self.node_id);
            let Some(block) = self.round.first_valid_block(index) else {
                return (TallyOutcome::Pending, Vec::new());
            };
            self.round.mark_processed(index);
            self.round.pending_block = None;

            if self.chain.contains(&block) {
                self.apply_reputation(index, own_verdict, true);
                return (TallyOutcome::Committed(block), Vec::new());
            }

            match self.chain.append(block.clone()) {
                Ok(()) => {
                    self.apply_reputation(index, own_verdict, true);
                    info!(index, valid, k, "Majority reached, block committed");
                    let actions = vec![Action::Broadcast {
                        message: PeerMessage::BlockchainUpdate(block.clone()),
                    }];
                    (TallyOutcome::Committed(block), actions)
                }
                Err(err) => {
                    // The majority agreed on a block this replica cannot
                    // apply; the round fails safely with the chain unchanged.
                    warn!(index, error = %err, "Majority block could not be appended");
                    self.apply_reputation(index, own_verdict, false);
                    (TallyOutcome::Rejected, Vec::new())
                }
            }
        } else if invalid * 2 > k {
            let own_verdict = self.round.verdict_of(index, &self.node_id);
            self.round.mark_processed(index);
            self.round.pending_block = None;
            self.apply_reputation(index, own_verdict, false);
            warn!(index, invalid, k, "Majority rejected block");
            (TallyOutcome::Rejected, Vec::new())
        } else {
            (TallyOutcome::Pending, Vec::new())
        }
    }

    /// Informational reputation scoring on terminal outcomes.
    fn apply_reputation(&mut self, index: u64, own_verdict: Option<Verdict>, accepted: bool) {
        let delta = if self.round.proposed.contains(&index) {
            if accepted {
                10
            } else {
                -10
            }
        } else if let Some(verdict) = own_verdict {
            if (verdict == Verdict::Valid) == accepted {
                5
            } else {
                -5
            }
        } else {
            return;
        };
        self.reputation += delta;
        debug!(index, delta, score = self.reputation, "Reputation updated");
    }
}
