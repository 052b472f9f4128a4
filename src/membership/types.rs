use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// Opaque identity of a cluster node, assigned at startup and immutable for
/// the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// A single member of the cluster.
///
/// `gossip_addr` carries UDP membership traffic, `http_addr` carries the
/// inter-node cluster protocol. The `incarnation` orders updates about the
/// same node and lets a node refute a false suspicion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub gossip_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// Gossip datagrams, encoded with bincode.
///
/// - `Join`: sent by a starting node to its seeds.
/// - `Ping/Ack`: liveness probe; the ack piggybacks the full member list.
/// - `Suspect/Alive`: disseminate health changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Join { node: Node },

    Ping { from: Node },

    Ack { from: Node, members: Vec<Node> },

    Suspect { node_id: NodeId, incarnation: u64 },

    Alive { node_id: NodeId, incarnation: u64 },
}

/// Topology changes observed by the local membership service.
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    /// A node became reachable (first contact or back from the dead).
    Joined(Node),
    /// A node was declared dead after the suspicion timeout.
    Failed(NodeId),
}
