use std::sync::{Arc, Weak};

use super::deliver_status;
use super::members::RoomMembersService;
use super::protocol::{CHANNEL_ROOM_EDIT, EditRoomRequest, RoomEditAction};
use super::rooms::RoomsService;
use super::types::RoomInfo;
use super::users::UsersService;
use crate::forward::{
    ForwardCallback, ForwardFailure, ForwardRequest, ForwardResult, ForwardingService,
};
use crate::messaging::{ClientSession, MessageHub};

pub const SERVICE_EDIT: &str = "room_edit";

/// Renames rooms. The rename runs on the node owning the room, whichever
/// node the client is connected to.
pub struct RoomEditService {
    forwarding: ForwardingService,
    rooms: Arc<RoomsService>,
    users: Arc<UsersService>,
    members: Arc<RoomMembersService>,
}

impl RoomEditService {
    pub fn new(
        forwarding: ForwardingService,
        rooms: Arc<RoomsService>,
        users: Arc<UsersService>,
        members: Arc<RoomMembersService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            forwarding,
            rooms,
            users,
            members,
        })
    }

    pub fn start(self: &Arc<Self>) {
        let service: Weak<Self> = Arc::downgrade(self);
        self.forwarding.cluster().services().register(
            SERVICE_EDIT,
            move |request: ForwardRequest| -> ForwardResult<RoomInfo> {
                let Some(service) = service.upgrade() else {
                    return ForwardResult::ignore("room edit service stopped");
                };
                match request.payload_as::<RoomEditAction>() {
                    Ok(action) => service.edit_owned(&action),
                    Err(e) => ForwardResult::failure(e.to_string()),
                }
            },
        );
    }

    pub fn stop(&self) {
        self.forwarding.cluster().services().unregister(SERVICE_EDIT);
    }

    /// Handles `/service/room/edit` from a local client.
    pub fn edit(&self, session: &Arc<ClientSession>, request: EditRoomRequest) {
        let Some(user) = self.users.user_of(session) else {
            deliver_status(session, "Cannot edit room, unknown user");
            return;
        };
        let Some(owner) = self.rooms.find_owner(request.room_id) else {
            deliver_status(session, "Cannot edit room, unknown owner node");
            return;
        };

        tracing::debug!(
            "Forwarding edit of room {} from {} to {}",
            request.room_id,
            user,
            owner
        );
        let action = RoomEditAction {
            user_id: user.id,
            room_id: request.room_id,
            room_name: request.room_name,
        };
        let reply = EditReply {
            hub: self.forwarding.cluster().hub().clone(),
            rooms: self.rooms.clone(),
        };
        self.forwarding.forward::<_, RoomInfo, _, _>(
            &owner,
            SERVICE_EDIT,
            &action,
            session.id().to_string(),
            reply,
        );
    }

    /// Applies an edit on the owning node. A room or user this node cannot
    /// see is ignored: ownership moved, or the user went away.
    pub(crate) fn edit_owned(&self, action: &RoomEditAction) -> ForwardResult<RoomInfo> {
        let Some(room) = self.rooms.get_local_room(action.room_id) else {
            return ForwardResult::ignore("Cannot edit room, unknown room");
        };
        let Some(user) = self.users.find(&action.user_id) else {
            return ForwardResult::ignore("Cannot edit room, unknown user");
        };
        if !self.members.is_member(room.id, &user) {
            return ForwardResult::failure("Cannot edit room, user not member of the room");
        }
        let Some(name) = action.room_name.as_deref().map(str::trim).filter(|n| !n.is_empty())
        else {
            return ForwardResult::failure("Cannot edit room, no new room name");
        };

        let edited = room.renamed(name);
        match self.rooms.replace_room(edited.clone()) {
            Ok(_) => {
                tracing::info!("{} renamed {} to '{}'", user, room, edited.name);
                ForwardResult::Success(edited)
            }
            Err(e) => ForwardResult::failure(e.to_string()),
        }
    }
}

struct EditReply {
    hub: Arc<MessageHub>,
    rooms: Arc<RoomsService>,
}

impl ForwardCallback<RoomInfo, String> for EditReply {
    fn on_succeeded(self, room: RoomInfo, session_id: String) {
        if let Some(session) = self.hub.find_session(&session_id) {
            match serde_json::to_value(&room) {
                Ok(data) => session.deliver(CHANNEL_ROOM_EDIT, data),
                Err(e) => tracing::error!("Cannot encode {}: {}", room, e),
            }
        }
        self.rooms.broadcast_rooms();
    }

    fn on_failed(self, failure: ForwardFailure, session_id: String) {
        if let Some(session) = self.hub.find_session(&session_id) {
            deliver_status(&session, &failure.to_string());
        }
    }
}
