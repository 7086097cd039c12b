//! Blocks and the canonical hash preimage.

use crate::{sha256_hex, Transaction};
use serde::{Deserialize, Serialize};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// `entropy` of the genesis block.
pub const GENESIS_ENTROPY: &str = "0";

/// Default genesis timestamp; every replica of a cluster must agree on the
/// value actually configured.
pub const DEFAULT_GENESIS_TIMESTAMP: f64 = 1_700_000_000.0;

/// A chain entry.
///
/// The `hash` field is a hex SHA-256 over the canonical preimage
///
/// ```text
/// decimal(index) || previous_hash || canonical(transactions) || entropy || repr(timestamp)
/// ```
///
/// with no separators, where `canonical(transactions)` is the compact JSON
/// array with object keys in client-submitted order and `repr(timestamp)` is
/// Rust's shortest round-trip `Display` for f64. The preimage is a wire
/// contract: every replica must produce it bit-for-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
    pub entropy: String,
    pub timestamp: f64,
    pub hash: String,
}

impl Block {
    /// Build a block at `index`, computing its hash from the other fields.
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        transactions: Vec<Transaction>,
        entropy: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash: previous_hash.into(),
            transactions,
            entropy: entropy.into(),
            timestamp,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// The genesis block for an agreed timestamp.
    pub fn genesis(timestamp: f64) -> Self {
        Self::new(
            0,
            GENESIS_PREVIOUS_HASH,
            Vec::new(),
            GENESIS_ENTROPY,
            timestamp,
        )
    }

    /// Recompute the hash from the block's fields.
    pub fn compute_hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}",
            self.index,
            self.previous_hash,
            Transaction::canonical_list(&self.transactions),
            self.entropy,
            self.timestamp,
        );
        sha256_hex(&preimage)
    }

    /// Whether the stored hash matches the fields.
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}
