use std::sync::Arc;

use super::deliver_status;
use super::history::ChatHistoryRequestService;
use super::members::RoomMembersService;
use super::protocol::{CHANNEL_ROOM_JOIN, CHANNEL_ROOM_LEAVE, RoomRequest};
use super::rooms::RoomsService;
use super::types::RoomInfo;
use super::users::UsersService;
use crate::messaging::ClientSession;

/// Handles `/service/room/join`: admits a user whose tier the room allows,
/// then sends the room, its members and its recent history.
pub struct RoomJoinService {
    rooms: Arc<RoomsService>,
    users: Arc<UsersService>,
    members: Arc<RoomMembersService>,
    history: Arc<ChatHistoryRequestService>,
}

impl RoomJoinService {
    pub fn new(
        rooms: Arc<RoomsService>,
        users: Arc<UsersService>,
        members: Arc<RoomMembersService>,
        history: Arc<ChatHistoryRequestService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms,
            users,
            members,
            history,
        })
    }

    pub fn join(&self, session: &Arc<ClientSession>, request: RoomRequest) {
        tracing::debug!("Join room {} request from {}", request.room_id, session.id());
        let Some(room) = self.rooms.find_room(request.room_id) else {
            deliver_status(session, "Cannot join room, unknown room");
            return;
        };
        let Some(user) = self.users.user_of(session) else {
            deliver_status(session, "Cannot join room, unknown user");
            return;
        };
        if !room.membership.implies(user.membership) {
            deliver_status(
                session,
                &format!("Cannot join room, no permission to join room {}", room.id),
            );
            return;
        }
        if !self.members.join(&room, &user) {
            deliver_status(
                session,
                &format!("Cannot join room, no members for room {}", room.id),
            );
            return;
        }

        deliver_room(session, CHANNEL_ROOM_JOIN, &room);
        self.members.deliver_members(session, room.id);
        self.history.request(session.id(), &room);
    }
}

/// Handles `/service/room/leave`.
pub struct RoomLeaveService {
    rooms: Arc<RoomsService>,
    users: Arc<UsersService>,
    members: Arc<RoomMembersService>,
}

impl RoomLeaveService {
    pub fn new(
        rooms: Arc<RoomsService>,
        users: Arc<UsersService>,
        members: Arc<RoomMembersService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms,
            users,
            members,
        })
    }

    pub fn leave(&self, session: &Arc<ClientSession>, request: RoomRequest) {
        tracing::debug!("Leave room {} request from {}", request.room_id, session.id());
        let Some(room) = self.rooms.find_room(request.room_id) else {
            deliver_status(session, "Cannot leave room, unknown room");
            return;
        };
        let Some(user) = self.users.user_of(session) else {
            deliver_status(session, "Cannot leave room, unknown user");
            return;
        };

        self.members.leave(&room, &user);
        deliver_room(session, CHANNEL_ROOM_LEAVE, &room);
    }
}

fn deliver_room(session: &ClientSession, channel: &str, room: &RoomInfo) {
    match serde_json::to_value(room) {
        Ok(data) => session.deliver(channel, data),
        Err(e) => tracing::error!("Cannot encode {}: {}", room, e),
    }
}
