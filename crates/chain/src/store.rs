//! Chain store state.

use chaosledger_types::{Block, Transaction};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

/// Reasons an append can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("block index {found} does not extend the chain (expected {expected})")]
    IndexGap { expected: u64, found: u64 },

    #[error("block previous_hash does not match the chain tip")]
    PrevHashMismatch,

    #[error("block hash does not match its fields")]
    HashMismatch,
}

/// Insertion-ordered pool of pending transactions, deduplicated by `id`.
#[derive(Debug, Default)]
pub struct Mempool {
    entries: Vec<Transaction>,
    ids: HashSet<String>,
}

impl Mempool {
    /// Add a transaction if its `id` is not already pooled.
    ///
    /// Returns `true` when the transaction was newly added; a duplicate id is
    /// an idempotent no-op returning `false`.
    pub fn submit(&mut self, tx: Transaction) -> bool {
        let Some(id) = tx.id() else {
            return false;
        };
        if self.ids.contains(id) {
            debug!(tx_id = id, "Duplicate transaction ignored");
            return false;
        }
        self.ids.insert(id.to_string());
        self.entries.push(tx);
        true
    }

    /// The first `limit` entries in insertion order, without removal.
    pub fn take(&self, limit: usize) -> Vec<Transaction> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// Remove every entry whose `id` appears in `txs`.
    pub fn remove(&mut self, txs: &[Transaction]) {
        let removed: HashSet<&str> = txs.iter().filter_map(Transaction::id).collect();
        if removed.is_empty() {
            return;
        }
        self.entries
            .retain(|tx| tx.id().map_or(true, |id| !removed.contains(id)));
        self.ids.retain(|id| !removed.contains(id.as_str()));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All pooled transactions in insertion order.
    pub fn entries(&self) -> &[Transaction] {
        &self.entries
    }
}

/// The accepted chain plus the pending transaction pool.
#[derive(Debug)]
pub struct ChainStore {
    chain: Vec<Block>,
    pub mempool: Mempool,
}

impl ChainStore {
    /// Start a chain from its genesis block.
    ///
    /// The genesis hash must match its fields; replicas agree on the genesis
    /// out of band and verify it before serving.
    pub fn new(genesis: Block) -> Result<Self, ChainError> {
        if !genesis.hash_is_valid() {
            return Err(ChainError::HashMismatch);
        }
        Ok(Self {
            chain: vec![genesis],
            mempool: Mempool::default(),
        })
    }

    /// The latest accepted block.
    pub fn tip(&self) -> &Block {
        self.chain.last().expect("chain always holds genesis")
    }

    /// Number of blocks on the chain, genesis included.
    pub fn len(&self) -> u64 {
        self.chain.len() as u64
    }

    /// The full chain in order.
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Whether `block` is already on the chain at its index with the same
    /// hash. Used to absorb duplicate chain-update gossip.
    pub fn contains(&self, block: &Block) -> bool {
        self.chain
            .get(block.index as usize)
            .is_some_and(|existing| existing.hash == block.hash)
    }

    /// Append a block extending the tip.
    ///
    /// Succeeds iff the index extends the chain, the previous hash matches
    /// the tip, and the block hash matches its fields. On success the block's
    /// transactions leave the mempool.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        let expected = self.len();
        if block.index != expected {
            return Err(ChainError::IndexGap {
                expected,
                found: block.index,
            });
        }
        if block.previous_hash != self.tip().hash {
            return Err(ChainError::PrevHashMismatch);
        }
        if !block.hash_is_valid() {
            return Err(ChainError::HashMismatch);
        }

        self.mempool.remove(&block.transactions);
        info!(
            index = block.index,
            hash = %block.hash,
            tx_count = block.transactions.len(),
            "Block appended"
        );
        self.chain.push(block);
        Ok(())
    }
}
