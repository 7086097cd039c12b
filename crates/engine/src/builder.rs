//! Deterministic transaction reordering and block validation.
//!
//! # Wire contract
//!
//! The shuffle PRG is part of the protocol: every replica must derive the
//! identical permutation from the same aggregate entropy. The pinned
//! construction is
//!
//! 1. normalize the aggregate by parsing it as f64 and reformatting `"{:.6}"`,
//! 2. seed a `ChaCha8Rng` with the full 32-byte SHA-256 digest of the
//!    normalized string,
//! 3. run the repeated-swap shuffle, selecting each swap index as
//!    `next_u32() % (i + 1)`.
//!
//! Changing any of these three steps is a wire-breaking change.

use crate::error::EngineError;
use chaosledger_types::{sha256_digest, Block, Transaction};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Normalize an entropy string to the canonical six-decimal form.
///
/// Fails with `BadEntropy` when the input does not parse as a finite real.
pub fn normalize_entropy(entropy: &str) -> Result<String, EngineError> {
    let value: f64 = entropy
        .trim()
        .parse()
        .map_err(|_| EngineError::BadEntropy(format!("not a real number: {entropy:?}")))?;
    if !value.is_finite() {
        return Err(EngineError::BadEntropy(format!("not finite: {entropy:?}")));
    }
    Ok(format!("{value:.6}"))
}

/// Deterministically reorder `transactions` under the aggregate entropy.
///
/// Returns a permutation of the input; the same entropy yields the same
/// permutation on every replica.
pub fn reorder(
    transactions: &[Transaction],
    entropy: &str,
) -> Result<Vec<Transaction>, EngineError> {
    let normalized = normalize_entropy(entropy)?;
    let seed = sha256_digest(&normalized);
    let mut rng = ChaCha8Rng::from_seed(seed);

    let mut shuffled = transactions.to_vec();
    for i in (1..shuffled.len()).rev() {
        let j = rng.next_u32() as usize % (i + 1);
        shuffled.swap(i, j);
    }
    Ok(shuffled)
}

/// Validate a candidate block against this replica's view.
///
/// Pure: no chain side effects. Checks run in order and the first failure
/// is reported:
///
/// 1. the block extends the local tip (`PrevHashMismatch`),
/// 2. the entropy parses as a finite real (`BadEntropy`),
/// 3. reordering the local mempool snapshot under the block's entropy
///    reproduces the block's transactions (`TxOrderMismatch`),
/// 4. the block hash matches its fields (`HashMismatch`).
pub fn validate_block(
    block: &Block,
    mempool_snapshot: &[Transaction],
    tip_hash: &str,
) -> Result<(), EngineError> {
    if block.previous_hash != tip_hash {
        return Err(EngineError::PrevHashMismatch);
    }

    normalize_entropy(&block.entropy)?;

    let expected = reorder(mempool_snapshot, &block.entropy)?;
    if Transaction::canonical_list(&expected) != Transaction::canonical_list(&block.transactions) {
        return Err(EngineError::TxOrderMismatch);
    }

    if !block.hash_is_valid() {
        return Err(EngineError::HashMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str) -> Transaction {
        serde_json::from_str(&format!(r#"{{"id":"{id}","data":"x"}}"#)).unwrap()
    }

    fn pool(n: usize) -> Vec<Transaction> {
        (0..n).map(|i| tx(&format!("t{i}"))).collect()
    }

    #[test]
    fn normalize_pins_six_decimals() {
        assert_eq!(normalize_entropy("3016671560.8").unwrap(), "3016671560.800000");
        assert_eq!(normalize_entropy("0").unwrap(), "0.000000");
        // Already-normalized input is a fixed point.
        assert_eq!(
            normalize_entropy("3016671560.800000").unwrap(),
            "3016671560.800000"
        );
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(matches!(
            normalize_entropy("not entropy").unwrap_err(),
            EngineError::BadEntropy(_)
        ));
        assert!(matches!(
            normalize_entropy("inf").unwrap_err(),
            EngineError::BadEntropy(_)
        ));
        assert!(matches!(
            normalize_entropy("NaN").unwrap_err(),
            EngineError::BadEntropy(_)
        ));
    }

    #[test]
    fn reorder_yields_a_permutation() {
        let transactions = pool(10);
        let shuffled = reorder(&transactions, "3016671560.800000").unwrap();
        assert_eq!(shuffled.len(), transactions.len());
        for t in &transactions {
            assert!(shuffled.iter().any(|s| s.id() == t.id()));
        }
    }

    #[test]
    fn reorder_is_deterministic_across_calls() {
        // The PRG is re-seeded per call: two calls simulate two replicas.
        let transactions = pool(10);
        let a = reorder(&transactions, "3016671560.800000").unwrap();
        let b = reorder(&transactions, "3016671560.800000").unwrap();
        assert_eq!(
            Transaction::canonical_list(&a),
            Transaction::canonical_list(&b)
        );
    }

    #[test]
    fn unnormalized_entropy_reorders_like_its_normal_form() {
        let transactions = pool(8);
        let a = reorder(&transactions, "3016671560.8").unwrap();
        let b = reorder(&transactions, "3016671560.800000").unwrap();
        assert_eq!(
            Transaction::canonical_list(&a),
            Transaction::canonical_list(&b)
        );
    }

    #[test]
    fn different_entropy_usually_means_a_different_order() {
        let transactions = pool(10);
        let a = reorder(&transactions, "1.000000").unwrap();
        let b = reorder(&transactions, "2.000000").unwrap();
        // 10! orderings; a collision here would indicate a broken seed path.
        assert_ne!(
            Transaction::canonical_list(&a),
            Transaction::canonical_list(&b)
        );
    }

    #[test]
    fn reorder_handles_tiny_pools() {
        assert!(reorder(&[], "1.000000").unwrap().is_empty());
        let one = pool(1);
        assert_eq!(reorder(&one, "1.000000").unwrap(), one);
    }

    fn valid_block(snapshot: &[Transaction], tip_hash: &str) -> Block {
        let ordered = reorder(snapshot, "42.000000").unwrap();
        Block::new(1, tip_hash, ordered, "42.000000", 100.0)
    }

    #[test]
    fn validation_accepts_a_well_formed_block() {
        let snapshot = pool(3);
        let block = valid_block(&snapshot, "aa");
        validate_block(&block, &snapshot, "aa").unwrap();
    }

    #[test]
    fn validation_rejects_a_stale_previous_hash() {
        let snapshot = pool(3);
        let block = valid_block(&snapshot, "aa");
        assert_eq!(
            validate_block(&block, &snapshot, "bb").unwrap_err(),
            EngineError::PrevHashMismatch
        );
    }

    #[test]
    fn validation_rejects_unparsable_entropy() {
        let snapshot = pool(2);
        let mut block = valid_block(&snapshot, "aa");
        block.entropy = "garbage".into();
        block.hash = block.compute_hash();
        assert!(matches!(
            validate_block(&block, &snapshot, "aa").unwrap_err(),
            EngineError::BadEntropy(_)
        ));
    }

    #[test]
    fn validation_rejects_a_divergent_ordering() {
        let snapshot = pool(3);
        let mut block = valid_block(&snapshot, "aa");
        block.transactions.swap(0, 1);
        block.hash = block.compute_hash();
        assert_eq!(
            validate_block(&block, &snapshot, "aa").unwrap_err(),
            EngineError::TxOrderMismatch
        );
    }

    #[test]
    fn validation_rejects_a_divergent_mempool() {
        let snapshot = pool(3);
        let block = valid_block(&snapshot, "aa");
        let other_snapshot = pool(4);
        assert_eq!(
            validate_block(&block, &other_snapshot, "aa").unwrap_err(),
            EngineError::TxOrderMismatch
        );
    }

    #[test]
    fn validation_rejects_a_flipped_hash() {
        let snapshot = pool(3);
        let mut block = valid_block(&snapshot, "aa");
        // Flip one hex digit.
        let mut chars: Vec<char> = block.hash.chars().collect();
        chars[0] = if chars[0] == '0' { '1' } else { '0' };
        block.hash = chars.into_iter().collect();
        assert_eq!(
            validate_block(&block, &snapshot, "aa").unwrap_err(),
            EngineError::HashMismatch
        );
    }
}
