//! Cluster Context Module
//!
//! The node-local hub every distributed primitive plugs into.
//!
//! ## Core Concepts
//! - **Transport**: point-to-point requests, fire-and-forget notifications and
//!   broadcasts between nodes. `HttpTransport` talks to real peers,
//!   `LoopbackNetwork` wires several clusters together inside one process.
//! - **Replicas**: named replicated objects (maps, lists, counters) receive
//!   peer partitions through [`ReplicaSink`].
//! - **Forward handlers**: named services reachable through the ownership
//!   forwarding protocol.
//! - **Publish relay**: observed channels are published locally and relayed to
//!   every peer.

pub mod context;
pub mod handlers;
pub mod loopback;
pub mod protocol;
pub mod transport;


use crate::membership::types::NodeId;

pub use context::Cluster;
pub use protocol::Version;

/// A replicated object that holds a local partition and cached copies of the
/// partitions owned by peers.
pub trait ReplicaSink: Send + Sync {
    /// Name shared by the instances of this object on every node.
    fn name(&self) -> &str;

    /// Stores the partition owned by `origin`. Snapshots whose `version` is not
    /// newer than the cached one are dropped.
    fn apply_remote(
        &self,
        origin: &NodeId,
        version: Version,
        snapshot: serde_json::Value,
    ) -> anyhow::Result<()>;

    /// Pushes the local partition to `target`.
    fn share_with(&self, target: &NodeId);

    /// Drops the cached partition of a node that left the cluster.
    fn forget(&self, node: &NodeId);
}
