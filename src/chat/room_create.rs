use std::sync::Arc;

use super::deliver_status;
use super::protocol::{CHANNEL_ROOM_CREATE, CreateRoomRequest};
use super::rooms::RoomsService;
use super::types::{Membership, RoomInfo};
use crate::cluster::Cluster;
use crate::messaging::ClientSession;
use crate::storage::{CounterCallback, MasterCounter};

/// Creates rooms with cluster-unique ids drawn from the `room_ids` counter.
pub struct RoomCreateService {
    rooms: Arc<RoomsService>,
    room_ids: Arc<MasterCounter>,
}

impl RoomCreateService {
    /// `master` is true on the node holding the `room_ids` counter, which
    /// then starts from `initial`.
    pub fn new(cluster: Arc<Cluster>, rooms: Arc<RoomsService>, master: bool, initial: i64) -> Arc<Self> {
        Arc::new(Self {
            room_ids: MasterCounter::new(cluster, "room_ids", master, initial),
            rooms,
        })
    }

    pub fn start(&self) {
        self.room_ids.start();
    }

    pub fn stop(&self) {
        self.room_ids.stop();
    }

    pub fn create(&self, session: &Arc<ClientSession>, request: CreateRoomRequest) {
        let name = request
            .room_name
            .map(|name| name.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            deliver_status(session, "Cannot create room, no room name");
            return;
        }

        tracing::debug!("Create room request from {}: {}", session.id(), name);
        self.room_ids.add_and_get(
            1,
            RoomIdAllocated {
                rooms: self.rooms.clone(),
                session: session.clone(),
                name,
            },
        );
    }
}

struct RoomIdAllocated {
    rooms: Arc<RoomsService>,
    session: Arc<ClientSession>,
    name: String,
}

impl CounterCallback for RoomIdAllocated {
    fn succeeded(self, room_id: i64) {
        let room = RoomInfo::new(room_id, self.name, Membership::Bronze);
        if let Err(e) = self.rooms.create_room(room.clone()) {
            tracing::warn!("Room id {} already in use: {}", room_id, e);
            deliver_status(&self.session, &format!("Cannot create room, {}", e));
            return;
        }

        match serde_json::to_value(&room) {
            Ok(data) => self.session.deliver(CHANNEL_ROOM_CREATE, data),
            Err(e) => tracing::error!("Cannot encode {}: {}", room, e),
        }
        self.rooms.broadcast_rooms();
    }

    fn failed(self, reason: String) {
        tracing::warn!("Cannot allocate room id for '{}': {}", self.name, reason);
        deliver_status(&self.session, &reason);
    }
}
