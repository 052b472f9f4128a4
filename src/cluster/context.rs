use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::ReplicaSink;
use super::protocol::{ClusterMessage, ClusterReply};
use super::transport::Transport;
use crate::forward::registry::ForwardRegistry;
use crate::forward::types::ForwardRequest;
use crate::membership::types::NodeId;
use crate::messaging::hub::MessageHub;

pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Node-local view of the cluster shared by every distributed primitive.
pub struct Cluster {
    local: NodeId,
    transport: Arc<dyn Transport>,
    replicas: DashMap<String, Weak<dyn ReplicaSink>>,
    services: ForwardRegistry,
    hub: Arc<MessageHub>,
    forward_timeout: Duration,
}

impl Cluster {
    pub fn new(
        local: NodeId,
        transport: Arc<dyn Transport>,
        hub: Arc<MessageHub>,
        forward_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            transport,
            replicas: DashMap::new(),
            services: ForwardRegistry::default(),
            hub,
            forward_timeout,
        })
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn services(&self) -> &ForwardRegistry {
        &self.services
    }

    pub fn hub(&self) -> &Arc<MessageHub> {
        &self.hub
    }

    pub fn forward_timeout(&self) -> Duration {
        self.forward_timeout
    }

    /// Makes `replica` reachable by peers and asks them for their partitions.
    pub fn register_replica<R: ReplicaSink + 'static>(&self, replica: &Arc<R>) {
        let name = replica.name().to_string();
        let weak: Weak<dyn ReplicaSink> = Arc::downgrade(replica) as Weak<dyn ReplicaSink>;
        self.replicas.insert(name.clone(), weak);
        tracing::debug!("Registered replicated object '{}'", name);

        self.transport.broadcast(ClusterMessage::Sync {
            origin: self.local.clone(),
            object: Some(name),
        });
    }

    pub fn unregister_replica(&self, name: &str) {
        if self.replicas.remove(name).is_some() {
            tracing::debug!("Unregistered replicated object '{}'", name);
        }
    }

    pub fn replica_names(&self) -> Vec<String> {
        self.replicas
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn replica(&self, name: &str) -> Option<Arc<dyn ReplicaSink>> {
        let weak = self.replicas.get(name).map(|entry| entry.value().clone())?;
        match weak.upgrade() {
            Some(replica) => Some(replica),
            None => {
                self.replicas.remove(name);
                None
            }
        }
    }

    fn all_replicas(&self) -> Vec<Arc<dyn ReplicaSink>> {
        let weak: Vec<Weak<dyn ReplicaSink>> = self
            .replicas
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        weak.into_iter().filter_map(|w| w.upgrade()).collect()
    }

    /// Pushes every local partition to a node that just became reachable.
    pub fn share_all_with(&self, node: &NodeId) {
        if node == &self.local {
            return;
        }
        let replicas = self.all_replicas();
        tracing::info!("Sharing {} replicated object(s) with {}", replicas.len(), node);
        for replica in replicas {
            replica.share_with(node);
        }
    }

    /// Exchanges every partition with a node that joined or came back: pushes
    /// the local ones and asks it for its own.
    pub fn rejoin(&self, node: &NodeId) {
        if node == &self.local {
            return;
        }
        self.share_all_with(node);
        self.transport.notify(
            node,
            ClusterMessage::Sync {
                origin: self.local.clone(),
                object: None,
            },
        );
    }

    /// Drops every cached partition owned by a failed node.
    pub fn forget_node(&self, node: &NodeId) {
        tracing::info!("Forgetting partitions owned by {}", node);
        for replica in self.all_replicas() {
            replica.forget(node);
        }
    }

    /// Publishes on an observed channel: local subscribers first, then every
    /// peer's subscribers.
    pub fn publish(&self, channel: &str, data: Value) {
        self.hub.publish_local(channel, data.clone());
        self.transport.broadcast(ClusterMessage::Publish {
            channel: channel.to_string(),
            data,
        });
    }

    /// Handles a message received from a peer.
    pub fn dispatch(&self, message: ClusterMessage) -> ClusterReply {
        tracing::trace!("Dispatching {} message", message.kind());

        match message {
            ClusterMessage::Forward {
                service,
                origin,
                payload,
            } => {
                let result = self
                    .services
                    .handle(&service, ForwardRequest { origin, payload });
                ClusterReply::Forwarded(result)
            }
            ClusterMessage::Replicate {
                object,
                origin,
                version,
                snapshot,
            } => {
                match self.replica(&object) {
                    Some(replica) => {
                        if let Err(e) = replica.apply_remote(&origin, version, snapshot) {
                            tracing::warn!(
                                "Rejected partition of '{}' from {}: {}",
                                object,
                                origin,
                                e
                            );
                        }
                    }
                    None => {
                        tracing::debug!("Partition for unknown object '{}' from {}", object, origin)
                    }
                }
                ClusterReply::Ack
            }
            ClusterMessage::Sync { origin, object } => {
                match object {
                    Some(name) => {
                        if let Some(replica) = self.replica(&name) {
                            replica.share_with(&origin);
                        }
                    }
                    None => self.share_all_with(&origin),
                }
                ClusterReply::Ack
            }
            ClusterMessage::Publish { channel, data } => {
                self.hub.publish_local(&channel, data);
                ClusterReply::Ack
            }
        }
    }
}
