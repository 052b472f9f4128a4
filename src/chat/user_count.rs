use serde_json::json;
use std::sync::Arc;

use super::protocol::{ATTR_COUNTED, CHANNEL_USERS};
use crate::cluster::Cluster;
use crate::messaging::{ClientSession, SessionListener};
use crate::storage::DistributedCounter;

/// Number of initialized client sessions across the cluster.
pub struct UserCountService {
    cluster: Arc<Cluster>,
    counter: Arc<DistributedCounter>,
}

impl UserCountService {
    pub fn new(cluster: Arc<Cluster>) -> Arc<Self> {
        Arc::new(Self {
            counter: DistributedCounter::new(cluster.clone(), "user_count"),
            cluster,
        })
    }

    pub fn start(&self) {
        self.counter.start();
    }

    pub fn stop(&self) {
        self.counter.stop();
    }

    pub fn count(&self) -> i64 {
        self.counter.sum()
    }

    /// Counts `session` once, on its `/service/init`.
    pub fn init(&self, session: &ClientSession) {
        match session.set_attribute(ATTR_COUNTED, &true) {
            Ok(None) => {}
            // already counted
            Ok(Some(_)) => return,
            Err(e) => {
                tracing::error!("Cannot mark session {}: {}", session.id(), e);
                return;
            }
        }

        let local = self.counter.add_and_get(1);
        tracing::debug!("Session {} counted, {} on this node", session.id(), local);
        self.broadcast();
    }

    fn broadcast(&self) {
        self.cluster.publish(CHANNEL_USERS, json!(self.count()));
    }
}

impl SessionListener for UserCountService {
    fn session_added(&self, _session: &Arc<ClientSession>) {}

    fn session_removed(&self, session: &Arc<ClientSession>, _expired: bool) {
        // sessions that never sent init were never counted
        if session.remove_attribute(ATTR_COUNTED).is_none() {
            return;
        }
        self.counter.add_and_get(-1);
        self.broadcast();
    }
}
