//! Engine configuration.

use chaosledger_types::NodeId;
use std::collections::BTreeMap;

/// Tunables of the round state machine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum transactions per proposed block.
    pub max_block_transactions: usize,

    /// Whether the leader generates and includes its own entropy sample at
    /// aggregation time. Off by default: the leader aggregates only received
    /// contributions. Required for single-replica clusters to make progress.
    pub include_own_entropy: bool,

    /// Optional per-node aggregation weights; nodes without an entry weigh 1.
    pub weights: BTreeMap<NodeId, f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_block_transactions: 50,
            include_own_entropy: false,
            weights: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_include_own_entropy(mut self, include: bool) -> Self {
        self.include_own_entropy = include;
        self
    }

    pub fn with_max_block_transactions(mut self, max: usize) -> Self {
        self.max_block_transactions = max;
        self
    }
}
