//! Master-elected counter.
//!
//! One node, chosen statically at startup, holds the authoritative value and
//! serializes every mutation. Followers forward increments to it and cache the
//! values it pushes. There is no failover: while the master is unreachable
//! every follower increment fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::partition::next_epoch;
use crate::cluster::protocol::ClusterMessage;
use crate::cluster::{Cluster, ReplicaSink, Version};
use crate::forward::{
    ForwardCallback, ForwardFailure, ForwardOutcome, ForwardResult, ForwardingService,
};
use crate::membership::types::NodeId;

/// Completion of [`MasterCounter::add_and_get`]. Exactly one method runs.
pub trait CounterCallback: Sized + Send + 'static {
    fn succeeded(self, value: i64);

    fn failed(self, reason: String);
}

#[derive(Debug, Serialize, Deserialize)]
struct AddRequest {
    delta: i64,
}

struct CounterState {
    value: i64,
    version: Version,
}

pub struct MasterCounter {
    name: String,
    service: String,
    cluster: Arc<Cluster>,
    forwarding: ForwardingService,
    is_master: bool,
    state: Mutex<CounterState>,
    master: RwLock<Option<NodeId>>,
}

impl MasterCounter {
    /// `master` marks the local node as the authoritative holder, starting
    /// from `initial`. Followers ignore `initial`.
    pub fn new(cluster: Arc<Cluster>, name: &str, master: bool, initial: i64) -> Arc<Self> {
        let master_node = master.then(|| cluster.local_id().clone());
        Arc::new(Self {
            name: name.to_string(),
            service: format!("master_counter/{}", name),
            forwarding: ForwardingService::new(cluster.clone()),
            cluster,
            is_master: master,
            state: Mutex::new(CounterState {
                value: if master { initial } else { 0 },
                version: if master {
                    Version::new(next_epoch(), 0)
                } else {
                    Version::default()
                },
            }),
            master: RwLock::new(master_node),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let counter: Weak<Self> = Arc::downgrade(self);
        self.cluster
            .services()
            .register(&self.service, move |request| -> ForwardResult<i64> {
                let Some(counter) = counter.upgrade() else {
                    return ForwardResult::ignore("counter stopped");
                };
                if !counter.is_master {
                    return ForwardResult::ignore(format!("not the master of {}", counter.name));
                }
                match request.payload_as::<AddRequest>() {
                    Ok(add) => ForwardResult::Success(counter.apply(add.delta)),
                    Err(e) => ForwardResult::failure(format!("bad counter request: {}", e)),
                }
            });

        self.cluster.register_replica(self);

        if self.is_master {
            let (value, version) = self.current();
            tracing::info!("Master of counter '{}' starting at {}", self.name, value);
            self.cluster
                .transport()
                .broadcast(self.value_message(value, version));
        }
    }

    pub fn stop(&self) {
        self.cluster.services().unregister(&self.service);
        self.cluster.unregister_replica(&self.name);
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    /// Last known master node.
    pub fn master(&self) -> Option<NodeId> {
        self.master
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Authoritative value on the master, last pushed value on followers.
    pub fn value(&self) -> i64 {
        self.lock_state().value
    }

    /// Adds `delta` and reports the new value.
    ///
    /// On the master `callback` runs before this returns. On a follower the
    /// increment is forwarded to the master and `callback` runs once it
    /// answers, or fails.
    pub fn add_and_get<F: CounterCallback>(&self, delta: i64, callback: F) {
        if self.is_master {
            callback.succeeded(self.apply(delta));
            return;
        }

        match self.master() {
            Some(master) => self.forwarding.forward::<_, i64, _, _>(
                &master,
                &self.service,
                &AddRequest { delta },
                (),
                CounterForward(callback),
            ),
            None => callback.failed(format!("Master of counter {} unknown", self.name)),
        }
    }

    pub async fn add_and_get_async(&self, delta: i64) -> Result<i64, ForwardFailure> {
        if self.is_master {
            return Ok(self.apply(delta));
        }

        let master = self.master().ok_or_else(|| {
            ForwardFailure::Rejected(format!("Master of counter {} unknown", self.name))
        })?;
        let payload = serde_json::to_value(AddRequest { delta })
            .map_err(|e| ForwardFailure::Protocol(e.to_string()))?;

        match self.forwarding.request::<i64>(&master, &self.service, payload).await {
            ForwardOutcome::Succeeded(value) => Ok(value),
            ForwardOutcome::Failed(failure) => Err(failure),
            ForwardOutcome::Ignored(reason) => Err(ForwardFailure::Rejected(reason)),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self) -> (i64, Version) {
        let state = self.lock_state();
        (state.value, state.version)
    }

    fn apply(&self, delta: i64) -> i64 {
        let (value, version) = {
            let mut state = self.lock_state();
            state.value += delta;
            state.version = state.version.next();
            (state.value, state.version)
        };
        tracing::debug!("Counter '{}' -> {}", self.name, value);
        self.cluster
            .transport()
            .broadcast(self.value_message(value, version));
        value
    }

    fn value_message(&self, value: i64, version: Version) -> ClusterMessage {
        ClusterMessage::Replicate {
            object: self.name.clone(),
            origin: self.cluster.local_id().clone(),
            version,
            snapshot: Value::from(value),
        }
    }
}

struct CounterForward<F>(F);

impl<F: CounterCallback> ForwardCallback<i64, ()> for CounterForward<F> {
    fn on_succeeded(self, result: i64, _context: ()) {
        self.0.succeeded(result);
    }

    fn on_failed(self, failure: ForwardFailure, _context: ()) {
        self.0.failed(failure.to_string());
    }

    fn on_ignored(self, reason: String, _context: ()) {
        self.0.failed(reason);
    }
}

impl ReplicaSink for MasterCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply_remote(&self, origin: &NodeId, version: Version, snapshot: Value) -> anyhow::Result<()> {
        if self.is_master {
            if origin != self.cluster.local_id() {
                tracing::warn!("Counter '{}': ignoring value pushed by {}", self.name, origin);
            }
            return Ok(());
        }

        let value: i64 = serde_json::from_value(snapshot)?;
        let mut master = self.master.write().unwrap_or_else(|e| e.into_inner());
        let mut state = self.lock_state();

        if master.as_ref() == Some(origin) && version <= state.version {
            return Ok(());
        }
        if master.as_ref() != Some(origin) {
            tracing::info!("Counter '{}': master is {}", self.name, origin);
        }
        *master = Some(origin.clone());
        state.value = value;
        state.version = version;
        Ok(())
    }

    fn share_with(&self, target: &NodeId) {
        if !self.is_master {
            return;
        }
        let (value, version) = self.current();
        self.cluster
            .transport()
            .notify(target, self.value_message(value, version));
    }

    fn forget(&self, node: &NodeId) {
        let mut master = self.master.write().unwrap_or_else(|e| e.into_inner());
        if master.as_ref() == Some(node) {
            tracing::warn!("Counter '{}': master {} left, increments will fail", self.name, node);
            *master = None;
        }
    }
}
