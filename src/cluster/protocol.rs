//! Inter-node Protocol
//!
//! Every message between nodes travels as a [`ClusterMessage`] serialized with
//! JSON to a single HTTP endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::forward::types::ForwardResult;
use crate::membership::types::NodeId;

/// Endpoint receiving every inter-node message.
pub const ENDPOINT_CLUSTER: &str = "/internal/cluster";

/// Version of one node's partition of a replicated object.
///
/// `epoch` is drawn when the object is created, so a node that restarts
/// under the same id outranks everything its previous run pushed. `seq`
/// counts mutations within an epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version {
    pub epoch: u64,
    pub seq: u64,
}

impl Version {
    pub fn new(epoch: u64, seq: u64) -> Self {
        Self { epoch, seq }
    }

    pub fn next(self) -> Self {
        Self {
            epoch: self.epoch,
            seq: self.seq + 1,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epoch, self.seq)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterMessage {
    /// Runs the named forward handler on the receiving node.
    Forward {
        service: String,
        origin: NodeId,
        payload: Value,
    },
    /// Whole partition of a replicated object owned by `origin`.
    Replicate {
        object: String,
        origin: NodeId,
        version: Version,
        snapshot: Value,
    },
    /// Asks the receiver to push its partition of `object`, or of every
    /// replicated object when `object` is `None`.
    Sync {
        origin: NodeId,
        object: Option<String>,
    },
    /// Relayed publication on an observed channel.
    Publish { channel: String, data: Value },
}

impl ClusterMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterMessage::Forward { .. } => "forward",
            ClusterMessage::Replicate { .. } => "replicate",
            ClusterMessage::Sync { .. } => "sync",
            ClusterMessage::Publish { .. } => "publish",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "result", rename_all = "snake_case")]
pub enum ClusterReply {
    Forwarded(ForwardResult<Value>),
    Ack,
}
