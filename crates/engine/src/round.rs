//! Per-round state: contributions, pending block, verdict tallies.

use chaosledger_types::{Block, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A replica's opinion on a proposed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Valid => "valid",
            Verdict::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded verdict, carrying the block data the verdict was cast on so
/// that a majority can commit without a separate fetch.
#[derive(Debug, Clone)]
pub struct RecordedVerdict {
    pub node_id: NodeId,
    pub verdict: Verdict,
    pub block: Block,
}

/// Round-scoped state, owned exclusively by the engine.
///
/// All of this is first-class: contributions live here between the
/// contribute and aggregate steps, the tally accumulates verdicts per block
/// index, and `processed` guarantees each index reaches a terminal outcome
/// at most once regardless of duplicate deliveries.
#[derive(Debug, Default)]
pub struct RoundState {
    /// Entropy contributions received this round (leader side).
    pub contributions: BTreeMap<NodeId, String>,

    /// The block currently in flight, if any.
    pub pending_block: Option<Block>,

    /// Verdicts per block index, at most one per node.
    tallies: HashMap<u64, Vec<RecordedVerdict>>,

    /// Block indices that already reached a terminal outcome.
    processed: BTreeSet<u64>,

    /// Block indices this replica itself proposed (for reputation scoring).
    pub proposed: BTreeSet<u64>,
}

impl RoundState {
    /// Record a verdict for `index`.
    ///
    /// Returns `false` (and changes nothing) when the index was already
    /// processed or this node already has a verdict on record.
    pub fn record_verdict(
        &mut self,
        index: u64,
        node_id: NodeId,
        verdict: Verdict,
        block: Block,
    ) -> bool {
        if self.processed.contains(&index) {
            return false;
        }
        let tally = self.tallies.entry(index).or_default();
        if tally.iter().any(|v| v.node_id == node_id) {
            return false;
        }
        tally.push(RecordedVerdict {
            node_id,
            verdict,
            block,
        });
        true
    }

    /// Valid and invalid counts for `index`.
    pub fn counts(&self, index: u64) -> (usize, usize) {
        match self.tallies.get(&index) {
            Some(tally) => {
                let valid = tally.iter().filter(|v| v.verdict == Verdict::Valid).count();
                (valid, tally.len() - valid)
            }
            None => (0, 0),
        }
    }

    /// The block carried by the first valid verdict for `index`.
    pub fn first_valid_block(&self, index: u64) -> Option<Block> {
        self.tallies.get(&index)?.iter().find_map(|v| {
            (v.verdict == Verdict::Valid).then(|| v.block.clone())
        })
    }

    /// This node's own verdict for `index`, if recorded.
    pub fn verdict_of(&self, index: u64, node_id: &NodeId) -> Option<Verdict> {
        self.tallies
            .get(&index)?
            .iter()
            .find(|v| &v.node_id == node_id)
            .map(|v| v.verdict)
    }

    /// Mark `index` terminal and drop its tally.
    pub fn mark_processed(&mut self, index: u64) {
        self.processed.insert(index);
        self.tallies.remove(&index);
    }

    pub fn is_processed(&self, index: u64) -> bool {
        self.processed.contains(&index)
    }
}
