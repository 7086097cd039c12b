//! Foundation types for the chaosledger protocol.
//!
//! This crate provides the types shared by every layer:
//!
//! - [`NodeId`]: stable replica identifier
//! - [`Transaction`]: opaque client-submitted record, canonically serialized
//! - [`Block`]: chain entry with a SHA-256 hash over a pinned preimage
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crate, making it the foundation layer. The canonical
//! serialization rules live here because both hashing and cross-replica block
//! validation depend on them being bit-for-bit identical everywhere.

mod block;
mod transaction;

pub use block::{Block, DEFAULT_GENESIS_TIMESTAMP, GENESIS_ENTROPY, GENESIS_PREVIOUS_HASH};
pub use transaction::Transaction;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier of a replica (e.g. `"node1"`).
///
/// Ordered lexicographically; the protocol uses that ordering for
/// deterministic iteration and tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Hex-encoded SHA-256 digest of a string's UTF-8 bytes.
pub fn sha256_hex(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    hex::encode(digest)
}

/// Raw SHA-256 digest of a string's UTF-8 bytes.
pub fn sha256_digest(data: &str) -> [u8; 32] {
    Sha256::digest(data.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_orders_lexicographically() {
        let a = NodeId::from("node1");
        let b = NodeId::from("node2");
        assert!(a < b);
        assert_eq!(a, NodeId::new("node1"));
    }

    #[test]
    fn node_id_serializes_transparently() {
        let id = NodeId::from("node3");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"node3\"");
        let back: NodeId = serde_json::from_str("\"node3\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn sha256_hex_is_stable() {
        let a = sha256_hex("chaos");
        let b = sha256_hex("chaos");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, sha256_hex("order"));
    }

    #[test]
    fn digest_matches_hex() {
        let digest = sha256_digest("sample");
        assert_eq!(hex::encode(digest), sha256_hex("sample"));
    }
}
