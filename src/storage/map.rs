//! Replicated partitioned map.
//!
//! Each node is the only writer of the keys in its local partition. Every
//! local mutation pushes the whole partition to the peers, which cache it
//! beside their own. Reads merge the local partition with the cached ones.

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use super::ReplicaError;
use super::partition::{RemotePartitions, VersionClock};
use crate::cluster::protocol::ClusterMessage;
use crate::cluster::{Cluster, ReplicaSink, Version};
use crate::membership::types::NodeId;

/// A change to one key, local or received from the owning peer.
#[derive(Debug, Clone)]
pub struct EntryEvent<K, V> {
    pub key: K,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
    /// Node whose partition holds the key.
    pub owner: NodeId,
    /// False when the change arrived from a peer.
    pub is_local: bool,
}

pub trait EntryListener<K, V>: Send + Sync {
    fn on_put(&self, _event: &EntryEvent<K, V>) {}

    fn on_removed(&self, _event: &EntryEvent<K, V>) {}
}

pub struct ReplicatedMap<K, V> {
    name: String,
    cluster: Arc<Cluster>,
    local: DashMap<K, V>,
    clock: VersionClock,
    remote: RemotePartitions<HashMap<K, V>>,
    listeners: RwLock<Vec<Arc<dyn EntryListener<K, V>>>>,
}

impl<K, V> ReplicatedMap<K, V>
where
    K: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(cluster: Arc<Cluster>, name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            cluster,
            local: DashMap::new(),
            clock: VersionClock::new(),
            remote: RemotePartitions::default(),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Joins the cluster: peers learn about this map and push their partitions.
    /// The local partition is pushed too, so peers drop whatever a previous
    /// run of this node left behind.
    pub fn start(self: &Arc<Self>) {
        self.cluster.register_replica(self);
        self.share();
    }

    pub fn stop(&self) {
        self.cluster.unregister_replica(&self.name);
    }

    pub fn add_listener(&self, listener: Arc<dyn EntryListener<K, V>>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Writes `key` into the local partition and pushes the partition to
    /// peers. Fails when a peer's partition already holds the key.
    pub fn put_and_share(&self, key: K, value: V) -> Result<Option<V>, ReplicaError> {
        if let Some(owner) = self.remote_owner(&key) {
            return Err(ReplicaError::NotOwner {
                object: self.name.clone(),
                key: format!("{:?}", key),
                owner,
            });
        }

        let old_value = self.local.insert(key.clone(), value.clone());
        self.share();

        let event = EntryEvent {
            key,
            old_value: old_value.clone(),
            new_value: Some(value),
            owner: self.cluster.local_id().clone(),
            is_local: true,
        };
        for listener in self.listeners() {
            listener.on_put(&event);
        }

        Ok(old_value)
    }

    /// Removes `key` from the local partition. Keys held by peers are left
    /// alone.
    pub fn remove_and_share(&self, key: &K) -> Option<V> {
        let (key, old_value) = self.local.remove(key)?;
        self.share();

        let event = EntryEvent {
            key,
            old_value: Some(old_value.clone()),
            new_value: None,
            owner: self.cluster.local_id().clone(),
            is_local: true,
        };
        for listener in self.listeners() {
            listener.on_removed(&event);
        }

        Some(old_value)
    }

    pub fn get_local(&self, key: &K) -> Option<V> {
        self.local.get(key).map(|entry| entry.value().clone())
    }

    /// Best locally known value for `key`, from any partition.
    pub fn find(&self, key: &K) -> Option<V> {
        self.get_local(key)
            .or_else(|| self.remote.find_map(|_, entries| entries.get(key).cloned()))
    }

    /// Last known owner of `key`.
    pub fn find_owner(&self, key: &K) -> Option<NodeId> {
        if self.local.contains_key(key) {
            return Some(self.cluster.local_id().clone());
        }
        self.remote_owner(key)
    }

    /// Union of the local partition and every cached peer partition.
    pub fn merge(&self) -> HashMap<K, V> {
        let mut merged = HashMap::new();
        self.remote.for_each(|_, entries| {
            for (key, value) in entries {
                merged.insert(key.clone(), value.clone());
            }
        });
        for entry in self.local.iter() {
            merged.insert(entry.key().clone(), entry.value().clone());
        }
        merged
    }

    pub fn local_entries(&self) -> Vec<(K, V)> {
        self.local
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn remote_owner(&self, key: &K) -> Option<NodeId> {
        self.remote.find_map(|node, entries| {
            if entries.contains_key(key) {
                Some(node.clone())
            } else {
                None
            }
        })
    }

    fn listeners(&self) -> Vec<Arc<dyn EntryListener<K, V>>> {
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
        let entries = self.local_entries();
        match serde_json::to_value(&entries) {
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

    fn fire_remote_diff(&self, origin: &NodeId, previous: HashMap<K, V>, current: &HashMap<K, V>) {
        let listeners = self.listeners();
        if listeners.is_empty() {
            return;
        }

        for (key, value) in current {
            let old_value = previous.get(key);
            if old_value == Some(value) {
                continue;
            }
            let event = EntryEvent {
                key: key.clone(),
                old_value: old_value.cloned(),
                new_value: Some(value.clone()),
                owner: origin.clone(),
                is_local: false,
            };
            for listener in &listeners {
                listener.on_put(&event);
            }
        }

        for (key, value) in previous {
            if current.contains_key(&key) {
                continue;
            }
            let event = EntryEvent {
                key,
                old_value: Some(value),
                new_value: None,
                owner: origin.clone(),
                is_local: false,
            };
            for listener in &listeners {
                listener.on_removed(&event);
            }
        }
    }
}

impl<K, V> ReplicaSink for ReplicatedMap<K, V>
where
    K: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply_remote(&self, origin: &NodeId, version: Version, snapshot: Value) -> anyhow::Result<()> {
        if origin == self.cluster.local_id() {
            return Ok(());
        }

        let entries: Vec<(K, V)> = serde_json::from_value(snapshot)?;
        let current: HashMap<K, V> = entries.into_iter().collect();

        let Some(previous) = self.remote.accept(origin, version, current.clone()) else {
            tracing::debug!("Stale partition of '{}' from {} (v{})", self.name, origin, version);
            return Ok(());
        };

        tracing::debug!(
            "Received partition of '{}' from {} (v{}, {} entries)",
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
            tracing::info!(
                "Dropped partition of '{}' owned by {} ({} entries)",
                self.name,
                node,
                previous.len()
            );
            self.fire_remote_diff(node, previous, &HashMap::new());
        }
    }
}
