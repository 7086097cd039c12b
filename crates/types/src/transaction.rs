//! Client-submitted transactions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque transaction record.
///
/// Transactions are JSON objects identified by a client-supplied `id`. The
/// engine never interprets the payload beyond requiring `id` and `data`
/// fields at admission.
///
/// Object keys keep the order in which the client submitted them
/// (`serde_json` is built with `preserve_order`), which is what makes
/// [`Transaction::canonical`] reproduce the same byte string on every
/// replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(pub Map<String, Value>);

impl Transaction {
    /// The client-supplied `id`, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Whether this record is admissible: an object carrying a string `id`
    /// and a `data` field.
    pub fn is_admissible(&self) -> bool {
        self.id().is_some() && self.0.contains_key("data")
    }

    /// Canonical serialization: compact JSON with keys in submission order.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).expect("transaction maps always serialize")
    }

    /// Canonical serialization of an ordered transaction list.
    ///
    /// This exact byte string is part of the block hash preimage and of the
    /// ordering check during block validation.
    pub fn canonical_list(transactions: &[Transaction]) -> String {
        serde_json::to_string(transactions).expect("transaction lists always serialize")
    }
}

impl From<Map<String, Value>> for Transaction {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
