//! Outbound peer fabric.
//!
//! Sends typed [`PeerMessage`]s to the static peer set over HTTP. Delivery
//! is at-least-once: each send is retried a bounded number of times with a
//! fixed backoff, and permanent failure is logged, never propagated to the
//! request that triggered it. The bootstrap leader announcement is the one
//! exception: it retries forever until the peer acknowledges.
//!
//! The fabric never holds the engine mutex; the dispatcher task receives
//! [`Action`]s over a channel after handlers have already unlocked.

use chaosledger_engine::{Action, PeerMessage};
use chaosledger_types::NodeId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fabric tunables.
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Backoff between retries.
    pub retry_backoff: Duration,

    /// Backoff for the infinite bootstrap announcement.
    pub announce_backoff: Duration,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            announce_backoff: Duration::from_secs(5),
        }
    }
}

/// Fabric failures. Logged by the dispatcher; never surfaced to API callers.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("peer {0} is not in the peer map")]
    UnknownPeer(NodeId),

    #[error("peer {node} unreachable after {attempts} attempts: {reason}")]
    PeerUnreachable {
        node: NodeId,
        attempts: u32,
        reason: String,
    },
}

/// Outbound HTTP fabric over the static peer map.
pub struct PeerFabric {
    client: reqwest::Client,
    peers: BTreeMap<NodeId, String>,
    config: FabricConfig,
}

impl PeerFabric {
    pub fn new(peers: BTreeMap<NodeId, String>, config: FabricConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            peers,
            config,
        })
    }

    /// Peer base URLs, for the `/peers` endpoint.
    pub fn peer_urls(&self) -> Vec<String> {
        self.peers.values().cloned().collect()
    }

    /// One POST of `message` to its endpoint on `base_url`.
    async fn post_once(&self, base_url: &str, message: &PeerMessage) -> Result<(), String> {
        let url = format!("{}{}", base_url, message.endpoint());
        let response = self
            .client
            .post(&url)
            .json(&message.body())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("peer returned {}", response.status()))
        }
    }

    /// Send with bounded retry.
    pub async fn send(&self, to: &NodeId, message: &PeerMessage) -> Result<(), FabricError> {
        let base_url = self
            .peers
            .get(to)
            .ok_or_else(|| FabricError::UnknownPeer(to.clone()))?;

        let attempts = self.config.max_retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.post_once(base_url, message).await {
                Ok(()) => {
                    debug!(to = %to, kind = message.kind(), attempt, "Message delivered");
                    return Ok(());
                }
                Err(reason) => {
                    warn!(
                        to = %to,
                        kind = message.kind(),
                        attempt,
                        %reason,
                        "Send failed"
                    );
                    last_error = reason;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        Err(FabricError::PeerUnreachable {
            node: to.clone(),
            attempts,
            reason: last_error,
        })
    }

    /// Announce the bootstrap leader to one peer, retrying until it lands.
    pub async fn announce_leader(&self, to: &NodeId, leader: &NodeId) {
        let message = PeerMessage::SetLeader(chaosledger_engine::LeaderAnnouncement {
            leader_id: leader.clone(),
        });
        let Some(base_url) = self.peers.get(to) else {
            warn!(to = %to, "Cannot announce leader to unknown peer");
            return;
        };

        loop {
            match self.post_once(base_url, &message).await {
                Ok(()) => {
                    info!(to = %to, leader = %leader, "Bootstrap leader announced");
                    return;
                }
                Err(reason) => {
                    warn!(to = %to, %reason, "Leader announcement failed, will retry");
                    tokio::time::sleep(self.config.announce_backoff).await;
                }
            }
        }
    }

    /// Execute one action: spawn its sends and return immediately.
    pub fn execute(self: &Arc<Self>, action: Action) {
        match action {
            Action::Unicast { to, message } => {
                let fabric = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(err) = fabric.send(&to, &message).await {
                        warn!(error = %err, "Unicast dropped");
                    }
                });
            }
            Action::Broadcast { message } => {
                for peer in self.peers.keys().cloned() {
                    let fabric = Arc::clone(self);
                    let message = message.clone();
                    tokio::spawn(async move {
                        if let Err(err) = fabric.send(&peer, &message).await {
                            warn!(error = %err, "Broadcast leg dropped");
                        }
                    });
                }
            }
        }
    }
}

/// Drain engine actions from `rx` onto the fabric.
pub fn spawn_dispatcher(
    fabric: Arc<PeerFabric>,
    mut rx: mpsc::Receiver<Action>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(action) = rx.recv().await {
            debug!(
                action = action.type_name(),
                kind = action.message().kind(),
                "Dispatching action"
            );
            fabric.execute(action);
        }
        debug!("Action dispatcher stopped");
    })
}
