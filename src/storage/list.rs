//! Replicated partitioned list.
//!
//! Set semantics per partition: any node may add and remove its own
//! elements, and the merged view is the union of all partitions. Concurrent
//! adds from different nodes never conflict.

use dashmap::DashSet;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use super::partition::{RemotePartitions, VersionClock};
use crate::cluster::protocol::ClusterMessage;
use crate::cluster::{Cluster, ReplicaSink, Version};
use crate::membership::types::NodeId;

#[derive(Debug, Clone)]
pub struct ElementEvent<V> {
    pub element: V,
    pub owner: NodeId,
    pub is_local: bool,
}

pub trait ElementListener<V>: Send + Sync {
    fn on_added(&self, _event: &ElementEvent<V>) {}

    fn on_removed(&self, _event: &ElementEvent<V>) {}
}

pub struct ReplicatedList<V> {
    name: String,
    cluster: Arc<Cluster>,
    local: DashSet<V>,
    clock: VersionClock,
    remote: RemotePartitions<HashSet<V>>,
    listeners: RwLock<Vec<Arc<dyn ElementListener<V>>>>,
}

impl<V> ReplicatedList<V>
where
    V: Clone + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(cluster: Arc<Cluster>, name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            cluster,
            local: DashSet::new(),
            clock: VersionClock::new(),
            remote: RemotePartitions::default(),
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(self: &Arc<Self>) {
        self.cluster.register_replica(self);
        self.share();
    }

    pub fn stop(&self) {
        self.cluster.unregister_replica(&self.name);
    }

    pub fn add_listener(&self, listener: Arc<dyn ElementListener<V>>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Adds `element` to the local partition. Returns false, without
    /// replicating, when it was already there.
    pub fn add_and_share(&self, element: V) -> bool {
        if !self.local.insert(element.clone()) {
            return false;
        }
        self.share();

        let event = ElementEvent {
            element,
            owner: self.cluster.local_id().clone(),
            is_local: true,
        };
        for listener in self.listeners() {
            listener.on_added(&event);
        }
        true
    }

    pub fn remove_and_share(&self, element: &V) -> bool {
        let Some(element) = self.local.remove(element) else {
            return false;
        };
        self.share();

        let event = ElementEvent {
            element,
            owner: self.cluster.local_id().clone(),
            is_local: true,
        };
        for listener in self.listeners() {
            listener.on_removed(&event);
        }
        true
    }

    /// Whether `element` is in any known partition.
    pub fn is_present(&self, element: &V) -> bool {
        self.local.contains(element)
            || self
                .remote
                .find_map(|_, elements| elements.contains(element).then_some(()))
                .is_some()
    }

    /// Union of every known partition.
    pub fn merge(&self) -> Vec<V> {
        let mut merged: HashSet<V> = self.local.iter().map(|e| e.key().clone()).collect();
        self.remote.for_each(|_, elements| {
            merged.extend(elements.iter().cloned());
        });
        merged.into_iter().collect()
    }

    pub fn local_elements(&self) -> Vec<V> {
        self.local.iter().map(|e| e.key().clone()).collect()
    }

    fn listeners(&self) -> Vec<Arc<dyn ElementListener<V>>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn share(&self) {
        let version = self.clock.next();
        if let Some(message) = self.partition_message(version) {
            self.cluster.transport().broadcast(message);
        }
    }

    fn partition_message(&self, version: Version) -> Option<ClusterMessage> {
        match serde_json::to_value(self.local_elements()) {
            Ok(snapshot) => Some(ClusterMessage::Replicate {
                object: self.name.clone(),
                origin: self.cluster.local_id().clone(),
                version,
                snapshot,
            }),
            Err(e) => {
                tracing::error!("Cannot encode partition of '{}': {}", self.name, e);
                None
            }
        }
    }

    fn fire_remote_diff(&self, origin: &NodeId, previous: HashSet<V>, current: &HashSet<V>) {
        let listeners = self.listeners();
        if listeners.is_empty() {
            return;
        }

        for element in current.difference(&previous) {
            let event = ElementEvent {
                element: element.clone(),
                owner: origin.clone(),
                is_local: false,
            };
            for listener in &listeners {
                listener.on_added(&event);
            }
        }
        for element in previous.difference(current) {
            let event = ElementEvent {
                element: element.clone(),
                owner: origin.clone(),
                is_local: false,
            };
            for listener in &listeners {
                listener.on_removed(&event);
            }
        }
    }
}

impl<V> ReplicaSink for ReplicatedList<V>
where
    V: Clone + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply_remote(&self, origin: &NodeId, version: Version, snapshot: Value) -> anyhow::Result<()> {
        if origin == self.cluster.local_id() {
            return Ok(());
        }

        let elements: Vec<V> = serde_json::from_value(snapshot)?;
        let current: HashSet<V> = elements.into_iter().collect();

        let Some(previous) = self.remote.accept(origin, version, current.clone()) else {
            tracing::debug!("Stale partition of '{}' from {} (v{})", self.name, origin, version);
            return Ok(());
        };

        tracing::debug!(
            "Received partition of '{}' from {} (v{}, {} elements)",
            self.name,
            origin,
            version,
            current.len()
        );
        self.fire_remote_diff(origin, previous.unwrap_or_default(), &current);
        Ok(())
    }

    fn share_with(&self, target: &NodeId) {
        let version = self.clock.current();
        if let Some(message) = self.partition_message(version) {
            self.cluster.transport().notify(target, message);
        }
    }

    fn forget(&self, node: &NodeId) {
        if let Some(previous) = self.remote.remove(node) {
            tracing::info!("Dropped partition of '{}' owned by {}", self.name, node);
            self.fire_remote_diff(node, previous, &HashSet::new());
        }
    }
}
