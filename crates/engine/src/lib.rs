//! Proof of Chaos round state machine.
//!
//! This crate implements the per-replica consensus engine as a synchronous,
//! deterministic state machine:
//!
//! ```text
//! engine operation -> (reply, Vec<Action>)
//! ```
//!
//! Each operation mutates local state and returns the outbound [`Action`]s
//! (unicast or broadcast of a typed [`PeerMessage`]) the caller must execute.
//! The engine performs no I/O and never blocks; the node shell owns the
//! single cluster-local mutex, calls one operation per inbound request, and
//! dispatches the returned actions after releasing the lock.
//!
//! # Round Flow
//!
//! 1. **Contribute**: non-leaders generate a Henon sample and unicast it to
//!    the leader.
//! 2. **Aggregate**: the leader fuses contributions into the aggregate
//!    entropy, elects the contributor closest to it as the next leader, and
//!    broadcasts both.
//! 3. **Propose**: the new leader reorders its mempool snapshot under the
//!    aggregate and broadcasts the candidate block.
//! 4. **Validate**: followers re-derive the ordering and broadcast verdicts.
//! 5. **Commit**: a strict majority of the cluster appends the block.

mod action;
mod builder;
mod config;
mod error;
mod message;
mod round;
mod state;

pub use action::Action;
pub use builder::{normalize_entropy, reorder, validate_block};
pub use config::EngineConfig;
pub use error::EngineError;
pub use message::{
    AggregateAnnouncement, EntropyContribution, LeaderAnnouncement, PeerMessage,
    VerdictAnnouncement,
};
pub use round::{RoundState, Verdict};
pub use state::{EngineState, TallyOutcome};

use chaosledger_types::Block;

/// Verify a replica's genesis block against the cluster-agreed hash.
///
/// All replicas must start from a bit-identical genesis; a mismatch is fatal
/// at boot, before the replica serves any request.
pub fn verify_genesis(genesis: &Block, expected_hash: Option<&str>) -> Result<(), EngineError> {
    if !genesis.hash_is_valid() {
        return Err(EngineError::GenesisMismatch(
            "genesis hash does not match its fields".to_string(),
        ));
    }
    if let Some(expected) = expected_hash {
        if genesis.hash != expected {
            return Err(EngineError::GenesisMismatch(format!(
                "genesis hash {} does not match expected {}",
                genesis.hash, expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosledger_types::DEFAULT_GENESIS_TIMESTAMP;

    #[test]
    fn verify_genesis_accepts_a_matching_hash() {
        let genesis = Block::genesis(DEFAULT_GENESIS_TIMESTAMP);
        verify_genesis(&genesis, None).unwrap();
        verify_genesis(&genesis, Some(&genesis.hash.clone())).unwrap();
    }

    #[test]
    fn verify_genesis_rejects_a_different_timestamp() {
        let genesis = Block::genesis(DEFAULT_GENESIS_TIMESTAMP);
        let other = Block::genesis(DEFAULT_GENESIS_TIMESTAMP + 1.0);
        let err = verify_genesis(&other, Some(&genesis.hash)).unwrap_err();
        assert!(matches!(err, EngineError::GenesisMismatch(_)));
    }

    #[test]
    fn verify_genesis_rejects_tampered_fields() {
        let mut genesis = Block::genesis(DEFAULT_GENESIS_TIMESTAMP);
        genesis.timestamp += 1.0;
        assert!(matches!(
            verify_genesis(&genesis, None).unwrap_err(),
            EngineError::GenesisMismatch(_)
        ));
    }
}
