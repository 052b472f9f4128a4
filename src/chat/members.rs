use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use super::protocol::{MemberAction, MembersUpdate, members_channel};
use super::types::{RoomInfo, UserInfo};
use super::users::UsersService;
use crate::cluster::Cluster;
use crate::messaging::{ClientSession, SessionListener};
use crate::storage::ReplicatedList;

/// Per-room member lists. Each room gets a replicated list named
/// `members_room_<id>` for as long as the room exists.
pub struct RoomMembersService {
    cluster: Arc<Cluster>,
    users: Arc<UsersService>,
    members: DashMap<i64, Arc<ReplicatedList<UserInfo>>>,
}

impl RoomMembersService {
    pub fn new(cluster: Arc<Cluster>, users: Arc<UsersService>) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            users,
            members: DashMap::new(),
        })
    }

    pub fn room_added(&self, room: &RoomInfo) {
        let list = match self.members.entry(room.id) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => {
                let name = format!("members_room_{}", room.id);
                let list = ReplicatedList::new(self.cluster.clone(), &name);
                slot.insert(list.clone());
                list
            }
        };
        list.start();
        tracing::debug!("Created member list for {}", room);
    }

    pub fn room_removed(&self, room: &RoomInfo) {
        if let Some((_, list)) = self.members.remove(&room.id) {
            list.stop();
            tracing::debug!("Destroyed member list for {}", room);
        }
    }

    fn list(&self, room_id: i64) -> Option<Arc<ReplicatedList<UserInfo>>> {
        self.members.get(&room_id).map(|entry| entry.value().clone())
    }

    /// Adds `user` to the members of `room`. Returns false when the room has
    /// no member list. Joining twice is not an error.
    pub fn join(&self, room: &RoomInfo, user: &UserInfo) -> bool {
        let Some(list) = self.list(room.id) else {
            return false;
        };

        if list.add_and_share(user.clone()) {
            tracing::info!("{} joined {}", user, room);
            self.broadcast(room.id, MemberAction::Join, user);
        }
        true
    }

    pub fn leave(&self, room: &RoomInfo, user: &UserInfo) -> bool {
        let Some(list) = self.list(room.id) else {
            return false;
        };

        let removed = list.remove_and_share(user);
        if removed {
            tracing::info!("{} left {}", user, room);
            self.broadcast(room.id, MemberAction::Leave, user);
        }
        removed
    }

    pub fn is_member(&self, room_id: i64, user: &UserInfo) -> bool {
        self.list(room_id).is_some_and(|list| list.is_present(user))
    }

    /// Members of `room_id` across the cluster.
    pub fn members(&self, room_id: i64) -> Option<Vec<UserInfo>> {
        self.list(room_id).map(|list| list.merge())
    }

    /// Sends the full member list of `room_id` to one session.
    pub fn deliver_members(&self, session: &ClientSession, room_id: i64) {
        let Some(members) = self.members(room_id) else {
            return;
        };
        let update = MembersUpdate {
            action: MemberAction::Join,
            members,
        };
        match serde_json::to_value(&update) {
            Ok(data) => session.deliver(&members_channel(room_id), data),
            Err(e) => tracing::error!("Cannot encode members of room {}: {}", room_id, e),
        }
    }

    fn broadcast(&self, room_id: i64, action: MemberAction, user: &UserInfo) {
        let update = MembersUpdate {
            action,
            members: vec![user.clone()],
        };
        match serde_json::to_value(&update) {
            Ok(data) => self.cluster.publish(&members_channel(room_id), data),
            Err(e) => tracing::error!("Cannot encode member update: {}", e),
        }
    }

    fn rooms_of(&self, user: &UserInfo) -> Vec<i64> {
        self.members
            .iter()
            .filter(|entry| entry.value().local_elements().contains(user))
            .map(|entry| *entry.key())
            .collect()
    }
}

impl SessionListener for RoomMembersService {
    fn session_added(&self, _session: &Arc<ClientSession>) {}

    fn session_removed(&self, session: &Arc<ClientSession>, _expired: bool) {
        let Some(user) = self.users.user_of(session) else {
            return;
        };

        for room_id in self.rooms_of(&user) {
            let Some(list) = self.list(room_id) else {
                continue;
            };
            if list.remove_and_share(&user) {
                tracing::info!("{} left room {} on disconnect", user, room_id);
                self.broadcast(room_id, MemberAction::Leave, &user);
            }
        }
    }
}
