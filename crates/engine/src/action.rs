//! Outbound actions returned by engine operations.

use crate::message::PeerMessage;
use chaosledger_types::NodeId;

/// A command the node shell executes after releasing the engine lock.
///
/// Actions are passive data; the engine never performs the send itself.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a message to one peer.
    Unicast { to: NodeId, message: PeerMessage },

    /// Send a message to every peer.
    Broadcast { message: PeerMessage },
}

impl Action {
    /// The carried message.
    pub fn message(&self) -> &PeerMessage {
        match self {
            Action::Unicast { message, .. } | Action::Broadcast { message } => message,
        }
    }

    /// The action type name, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Unicast { .. } => "Unicast",
            Action::Broadcast { .. } => "Broadcast",
        }
    }
}
