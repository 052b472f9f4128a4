use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use super::protocol::ATTR_USER;
use super::types::UserInfo;
use crate::cluster::Cluster;
use crate::messaging::{ClientSession, SessionListener};
use crate::storage::ReplicatedMap;

/// Users connected anywhere in the cluster, each node holding the users of
/// its own sessions.
pub struct UsersService {
    users: Arc<ReplicatedMap<String, UserInfo>>,
    /// user id -> id of the local session that registered the user
    sessions: DashMap<String, String>,
}

impl UsersService {
    pub fn new(cluster: Arc<Cluster>) -> Arc<Self> {
        Arc::new(Self {
            users: ReplicatedMap::new(cluster, "users"),
            sessions: DashMap::new(),
        })
    }

    pub fn start(&self) {
        self.users.start();
    }

    pub fn stop(&self) {
        self.users.stop();
    }

    pub fn find(&self, user_id: &str) -> Option<UserInfo> {
        self.users.find(&user_id.to_string())
    }

    /// The user authenticated on `session` at handshake.
    pub fn user_of(&self, session: &ClientSession) -> Option<UserInfo> {
        session.attribute::<UserInfo>(ATTR_USER)
    }

    pub fn user_count(&self) -> usize {
        self.users.merge().len()
    }
}

impl SessionListener for UsersService {
    fn session_added(&self, session: &Arc<ClientSession>) {
        let Some(user) = self.user_of(session) else {
            return;
        };

        match self.sessions.entry(user.id.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!("User {} already tracked on this node", user.id);
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(session.id().to_string());
            }
        }

        let user_id = user.id.clone();
        match self.users.put_and_share(user_id.clone(), user) {
            Ok(_) => tracing::debug!("Tracking user {}", user_id),
            // the same user id is connected through another node
            Err(e) => tracing::warn!("Cannot track user: {}", e),
        }
    }

    fn session_removed(&self, session: &Arc<ClientSession>, _expired: bool) {
        let Some(user) = self.user_of(session) else {
            return;
        };

        let owned = self
            .sessions
            .remove_if(&user.id, |_, session_id| session_id == session.id())
            .is_some();
        if owned && self.users.remove_and_share(&user.id).is_some() {
            tracing::debug!("Untracked user {}", user.id);
        }
    }
}
