//! Engine error taxonomy.

use chaosledger_chain::ChainError;
use thiserror::Error;

/// Every failure the round state machine can report.
///
/// Request-scoped variants surface to API callers as 4xx; the chain variants
/// double as validation verdict reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("this node is not the leader")]
    NotLeader,

    #[error("no entropy contributions recorded this round")]
    NoContributions,

    #[error("no transactions pending")]
    NoTransactions,

    #[error("bad entropy: {0}")]
    BadEntropy(String),

    #[error("previous hash does not match the chain tip")]
    PrevHashMismatch,

    #[error("block hash does not match its fields")]
    HashMismatch,

    #[error("transaction order does not match the canonical reordering")]
    TxOrderMismatch,

    #[error("block index {found} does not extend the chain (expected {expected})")]
    IndexGap { expected: u64, found: u64 },

    #[error("genesis mismatch: {0}")]
    GenesisMismatch(String),
}

impl From<ChainError> for EngineError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::IndexGap { expected, found } => Self::IndexGap { expected, found },
            ChainError::PrevHashMismatch => Self::PrevHashMismatch,
            ChainError::HashMismatch => Self::HashMismatch,
        }
    }
}

impl EngineError {
    /// Whether this error is scoped to a single request (client mistake or
    /// precondition failure) rather than a protocol violation.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest(_)
                | Self::NotLeader
                | Self::NoContributions
                | Self::NoTransactions
                | Self::BadEntropy(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_errors_map_onto_the_taxonomy() {
        assert_eq!(
            EngineError::from(ChainError::IndexGap {
                expected: 2,
                found: 5
            }),
            EngineError::IndexGap {
                expected: 2,
                found: 5
            }
        );
        assert_eq!(
            EngineError::from(ChainError::PrevHashMismatch),
            EngineError::PrevHashMismatch
        );
        assert_eq!(
            EngineError::from(ChainError::HashMismatch),
            EngineError::HashMismatch
        );
    }

    #[test]
    fn request_scoped_classification() {
        assert!(EngineError::NotLeader.is_request_scoped());
        assert!(EngineError::NoTransactions.is_request_scoped());
        assert!(!EngineError::PrevHashMismatch.is_request_scoped());
        assert!(!EngineError::GenesisMismatch("x".into()).is_request_scoped());
    }
}
