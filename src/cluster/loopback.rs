//! In-process transport.
//!
//! Connects several [`Cluster`]s living in the same process. Messages are
//! dispatched inline on the sender's task, so replication has settled by the
//! time a mutating call returns. Nodes can be cut off (`set_unreachable`) or
//! made to swallow requests without answering (`set_stalled`).

use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::context::{Cluster, DEFAULT_FORWARD_TIMEOUT};
use super::protocol::{ClusterMessage, ClusterReply};
use super::transport::{ReplyFuture, Transport};
use crate::membership::types::NodeId;
use crate::messaging::hub::MessageHub;

#[derive(Default)]
pub struct LoopbackNetwork {
    nodes: DashMap<NodeId, Weak<Cluster>>,
    unreachable: DashSet<NodeId>,
    stalled: DashSet<NodeId>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport_for(self: &Arc<Self>, local: NodeId) -> Arc<dyn Transport> {
        Arc::new(LoopbackTransport {
            network: self.clone(),
            local,
        })
    }

    /// Creates a cluster node with its own message hub and attaches it.
    pub fn node(self: &Arc<Self>, id: &str) -> Arc<Cluster> {
        self.node_with_timeout(id, DEFAULT_FORWARD_TIMEOUT)
    }

    pub fn node_with_timeout(self: &Arc<Self>, id: &str, forward_timeout: Duration) -> Arc<Cluster> {
        let local = NodeId::from(id);
        let cluster = Cluster::new(
            local.clone(),
            self.transport_for(local),
            MessageHub::new(),
            forward_timeout,
        );
        self.attach(&cluster);
        cluster
    }

    pub fn attach(&self, cluster: &Arc<Cluster>) {
        self.nodes
            .insert(cluster.local_id().clone(), Arc::downgrade(cluster));
    }

    pub fn set_unreachable(&self, node: &NodeId, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(node.clone());
        } else {
            self.unreachable.remove(node);
        }
    }

    pub fn set_stalled(&self, node: &NodeId, stalled: bool) {
        if stalled {
            self.stalled.insert(node.clone());
        } else {
            self.stalled.remove(node);
        }
    }

    fn connected(&self, from: &NodeId, to: &NodeId) -> bool {
        !self.unreachable.contains(from) && !self.unreachable.contains(to)
    }

    fn cluster(&self, node: &NodeId) -> Option<Arc<Cluster>> {
        let weak = self.nodes.get(node).map(|entry| entry.value().clone())?;
        weak.upgrade()
    }

    fn deliver(&self, from: &NodeId, to: &NodeId, message: ClusterMessage) -> Option<ClusterReply> {
        if !self.connected(from, to) || self.stalled.contains(to) {
            return None;
        }
        let cluster = self.cluster(to)?;
        Some(cluster.dispatch(message))
    }

    fn peers_of(&self, local: &NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| id != local)
            .collect()
    }
}

struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    local: NodeId,
}

impl Transport for LoopbackTransport {
    fn request(&self, target: &NodeId, message: ClusterMessage) -> ReplyFuture {
        if self.network.stalled.contains(target) && self.network.connected(&self.local, target) {
            return Box::pin(std::future::pending::<anyhow::Result<ClusterReply>>());
        }

        let reply = self.network.deliver(&self.local, target, message);
        let target = target.clone();
        Box::pin(async move { reply.ok_or_else(|| anyhow::anyhow!("Node {} unreachable", target)) })
    }

    fn notify(&self, target: &NodeId, message: ClusterMessage) {
        self.network.deliver(&self.local, target, message);
    }

    fn broadcast(&self, message: ClusterMessage) {
        for peer in self.network.peers_of(&self.local) {
            self.network.deliver(&self.local, &peer, message.clone());
        }
    }
}
