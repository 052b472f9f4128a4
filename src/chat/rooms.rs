use std::sync::{Arc, Weak};

use super::members::RoomMembersService;
use super::protocol::{ATTR_USER, CHANNEL_ROOMS};
use super::types::RoomInfo;
use crate::cluster::Cluster;
use crate::membership::types::NodeId;
use crate::messaging::{ClientSession, MessageHub, SessionListener};
use crate::storage::{EntryEvent, EntryListener, ReplicaError, ReplicatedMap};

/// The rooms of the cluster, each owned by the node that created it.
pub struct RoomsService {
    rooms: Arc<ReplicatedMap<i64, RoomInfo>>,
    members: Arc<RoomMembersService>,
    hub: Arc<MessageHub>,
}

impl RoomsService {
    pub fn new(cluster: Arc<Cluster>, members: Arc<RoomMembersService>) -> Arc<Self> {
        Arc::new(Self {
            rooms: ReplicatedMap::new(cluster.clone(), "rooms"),
            hub: cluster.hub().clone(),
            members,
        })
    }

    /// Joins the cluster and seeds `bootstrap` rooms into the local partition.
    pub fn start(self: &Arc<Self>, bootstrap: &[RoomInfo]) {
        self.rooms.add_listener(Arc::new(RoomsListener {
            service: Arc::downgrade(self),
        }));
        self.rooms.start();

        for room in bootstrap {
            match self.rooms.put_and_share(room.id, room.clone()) {
                Ok(_) => tracing::info!("Seeded {}", room),
                Err(e) => tracing::warn!("Cannot seed {}: {}", room, e),
            }
        }
        self.broadcast_rooms();
    }

    pub fn stop(&self) {
        self.rooms.stop();
    }

    /// Looks up a room in every partition.
    pub fn find_room(&self, room_id: i64) -> Option<RoomInfo> {
        self.rooms.find(&room_id)
    }

    /// Looks up a room only among the rooms this node owns.
    pub fn get_local_room(&self, room_id: i64) -> Option<RoomInfo> {
        self.rooms.get_local(&room_id)
    }

    pub fn find_owner(&self, room_id: i64) -> Option<NodeId> {
        self.rooms.find_owner(&room_id)
    }

    pub fn create_room(&self, room: RoomInfo) -> Result<(), ReplicaError> {
        tracing::info!("Creating {}", room);
        self.rooms.put_and_share(room.id, room).map(|_| ())
    }

    /// Swaps the stored room for `room` with the same id. Only the owner may
    /// call this.
    pub fn replace_room(&self, room: RoomInfo) -> Result<Option<RoomInfo>, ReplicaError> {
        tracing::info!("Replacing room {} with {}", room.id, room);
        self.rooms.put_and_share(room.id, room)
    }

    /// Every room in the cluster, ordered by id.
    pub fn rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self.rooms.merge().into_values().collect();
        rooms.sort_by_key(|room| room.id);
        rooms
    }

    fn rooms_json(&self) -> serde_json::Value {
        serde_json::to_value(self.rooms()).unwrap_or_default()
    }

    /// Sends the room list to the sessions of this node subscribed to `/rooms`.
    pub fn broadcast_rooms(&self) {
        let recipients = self.hub.publish_local(CHANNEL_ROOMS, self.rooms_json());
        tracing::debug!("Broadcast rooms to {} session(s)", recipients);
    }
}

struct RoomsListener {
    service: Weak<RoomsService>,
}

impl EntryListener<i64, RoomInfo> for RoomsListener {
    fn on_put(&self, event: &EntryEvent<i64, RoomInfo>) {
        let Some(service) = self.service.upgrade() else {
            return;
        };
        if let Some(room) = &event.new_value {
            service.members.room_added(room);
        }
        if !event.is_local {
            service.broadcast_rooms();
        }
    }

    fn on_removed(&self, event: &EntryEvent<i64, RoomInfo>) {
        let Some(service) = self.service.upgrade() else {
            return;
        };
        if let Some(room) = &event.old_value {
            service.members.room_removed(room);
        }
        if !event.is_local {
            service.broadcast_rooms();
        }
    }
}

impl SessionListener for RoomsService {
    fn session_added(&self, session: &Arc<ClientSession>) {
        if session.attribute::<serde_json::Value>(ATTR_USER).is_some() {
            session.deliver(CHANNEL_ROOMS, self.rooms_json());
        }
    }

    fn session_removed(&self, _session: &Arc<ClientSession>, _expired: bool) {}
}
