use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use super::partition::{RemotePartitions, VersionClock};
use crate::cluster::protocol::ClusterMessage;
use crate::cluster::{Cluster, ReplicaSink, Version};
use crate::membership::types::NodeId;

/// Additive counter: every node changes its own share without coordination
/// and the cluster-wide value is the sum of all shares.
pub struct DistributedCounter {
    name: String,
    cluster: Arc<Cluster>,
    value: AtomicI64,
    clock: VersionClock,
    remote: RemotePartitions<i64>,
}

impl DistributedCounter {
    pub fn new(cluster: Arc<Cluster>, name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            cluster,
            value: AtomicI64::new(0),
            clock: VersionClock::new(),
            remote: RemotePartitions::default(),
        })
    }

    pub fn start(self: &Arc<Self>) {
        self.cluster.register_replica(self);
        self.share();
    }

    pub fn stop(&self) {
        self.cluster.unregister_replica(&self.name);
    }

    /// Adds `delta` to the local share and returns the new local share.
    pub fn add_and_get(&self, delta: i64) -> i64 {
        let value = self.value.fetch_add(delta, Ordering::SeqCst) + delta;
        self.share();
        value
    }

    pub fn local_value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Local share plus the last known share of every peer.
    pub fn sum(&self) -> i64 {
        let mut total = self.local_value();
        self.remote.for_each(|_, share| total += *share);
        total
    }

    fn share(&self) {
        let version = self.clock.next();
        self.cluster
            .transport()
            .broadcast(self.share_message(version));
    }

    fn share_message(&self, version: Version) -> ClusterMessage {
        ClusterMessage::Replicate {
            object: self.name.clone(),
            origin: self.cluster.local_id().clone(),
            version,
            snapshot: Value::from(self.local_value()),
        }
    }
}

impl ReplicaSink for DistributedCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply_remote(&self, origin: &NodeId, version: Version, snapshot: Value) -> anyhow::Result<()> {
        if origin == self.cluster.local_id() {
            return Ok(());
        }
        let share: i64 = serde_json::from_value(snapshot)?;
        if self.remote.accept(origin, version, share).is_some() {
            tracing::debug!("Counter '{}': {} now holds {}", self.name, origin, share);
        }
        Ok(())
    }

    fn share_with(&self, target: &NodeId) {
        let version = self.clock.current();
        self.cluster
            .transport()
            .notify(target, self.share_message(version));
    }

    fn forget(&self, node: &NodeId) {
        if let Some(share) = self.remote.remove(node) {
            tracing::info!("Counter '{}': dropped share {} of {}", self.name, share, node);
        }
    }
}
