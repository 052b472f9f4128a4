use dashmap::DashMap;
use std::sync::Arc;

use super::protocol::CHANNEL_CHAT;
use super::rooms::RoomsService;
use super::types::{ChatHistoryInfo, ChatInfo, RoomChatInfo, RoomInfo};
use crate::forward::{
    ForwardCallback, ForwardFailure, ForwardRequest, ForwardResult, ForwardingService,
};
use crate::messaging::MessageHub;
use crate::storage::BoundedHistory;

pub const SERVICE_ARCHIVE: &str = "chat_history_archive";
pub const SERVICE_REQUEST: &str = "chat_history_request";

/// Recent messages of the rooms owned by this node.
pub struct ChatHistoryService {
    capacity: usize,
    histories: DashMap<i64, Arc<BoundedHistory<ChatInfo>>>,
}

impl ChatHistoryService {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            histories: DashMap::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn archive(&self, room_chat: &RoomChatInfo) {
        let history = self
            .histories
            .entry(room_chat.room.id)
            .or_insert_with(|| Arc::new(BoundedHistory::new(self.capacity)))
            .clone();
        history.push(room_chat.chat.clone());
        tracing::debug!("Archived chat for {}", room_chat.room);
    }

    pub fn retrieve(&self, room: &RoomInfo) -> ChatHistoryInfo {
        let chats = self
            .histories
            .get(&room.id)
            .map(|history| history.snapshot())
            .unwrap_or_default();
        ChatHistoryInfo {
            room: room.clone(),
            max_entries: self.capacity,
            chats,
        }
    }
}

// ============================================================================
// Archive: chat messages travel to the node owning the room
// ============================================================================

pub struct ChatHistoryArchiveService {
    forwarding: ForwardingService,
    rooms: Arc<RoomsService>,
    history: Arc<ChatHistoryService>,
}

impl ChatHistoryArchiveService {
    pub fn new(
        forwarding: ForwardingService,
        rooms: Arc<RoomsService>,
        history: Arc<ChatHistoryService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            forwarding,
            rooms,
            history,
        })
    }

    pub fn start(&self) {
        let rooms = self.rooms.clone();
        let history = self.history.clone();
        self.forwarding.cluster().services().register(
            SERVICE_ARCHIVE,
            move |request: ForwardRequest| -> ForwardResult<()> {
                let room_chat = match request.payload_as::<RoomChatInfo>() {
                    Ok(room_chat) => room_chat,
                    Err(e) => return ForwardResult::failure(e.to_string()),
                };
                // ownership moved since the sender looked it up
                if rooms.get_local_room(room_chat.room.id).is_none() {
                    return ForwardResult::ignore(format!("{} not owned here", room_chat.room));
                }
                history.archive(&room_chat);
                ForwardResult::Success(())
            },
        );
    }

    pub fn stop(&self) {
        self.forwarding.cluster().services().unregister(SERVICE_ARCHIVE);
    }

    pub fn archive(&self, room_chat: RoomChatInfo) {
        let Some(owner) = self.rooms.find_owner(room_chat.room.id) else {
            tracing::debug!("No owner for {}, chat not archived", room_chat.room);
            return;
        };
        let room_id = room_chat.room.id;
        self.forwarding
            .forward::<_, (), _, _>(&owner, SERVICE_ARCHIVE, &room_chat, room_id, Archived);
    }
}

struct Archived;

impl ForwardCallback<(), i64> for Archived {
    fn on_succeeded(self, _result: (), room_id: i64) {
        tracing::trace!("Chat archived for room {}", room_id);
    }

    fn on_failed(self, failure: ForwardFailure, room_id: i64) {
        tracing::debug!("Chat archival for room {} failed: {}", room_id, failure);
    }
}

// ============================================================================
// Request: a joining client receives the history kept by the owner
// ============================================================================

pub struct ChatHistoryRequestService {
    forwarding: ForwardingService,
    rooms: Arc<RoomsService>,
    history: Arc<ChatHistoryService>,
}

impl ChatHistoryRequestService {
    pub fn new(
        forwarding: ForwardingService,
        rooms: Arc<RoomsService>,
        history: Arc<ChatHistoryService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            forwarding,
            rooms,
            history,
        })
    }

    pub fn start(&self) {
        let rooms = self.rooms.clone();
        let history = self.history.clone();
        self.forwarding.cluster().services().register(
            SERVICE_REQUEST,
            move |request: ForwardRequest| -> ForwardResult<ChatHistoryInfo> {
                let room = match request.payload_as::<RoomInfo>() {
                    Ok(room) => room,
                    Err(e) => return ForwardResult::failure(e.to_string()),
                };
                if rooms.get_local_room(room.id).is_none() {
                    return ForwardResult::ignore(format!("{} not owned here", room));
                }
                ForwardResult::Success(history.retrieve(&room))
            },
        );
    }

    pub fn stop(&self) {
        self.forwarding.cluster().services().unregister(SERVICE_REQUEST);
    }

    /// Asks the owner of `room` for its history and delivers it to the
    /// session on `/service/chat`. Failures are silent.
    pub fn request(&self, session_id: &str, room: &RoomInfo) {
        let Some(owner) = self.rooms.find_owner(room.id) else {
            tracing::debug!("No owner for {}, history not requested", room);
            return;
        };
        let delivery = DeliverHistory {
            hub: self.forwarding.cluster().hub().clone(),
        };
        self.forwarding.forward::<_, ChatHistoryInfo, _, _>(
            &owner,
            SERVICE_REQUEST,
            room,
            session_id.to_string(),
            delivery,
        );
    }
}

struct DeliverHistory {
    hub: Arc<MessageHub>,
}

impl ForwardCallback<ChatHistoryInfo, String> for DeliverHistory {
    fn on_succeeded(self, history: ChatHistoryInfo, session_id: String) {
        // the client may have gone away in the meantime
        let Some(session) = self.hub.find_session(&session_id) else {
            return;
        };
        match serde_json::to_value(&history) {
            Ok(data) => session.deliver(CHANNEL_CHAT, data),
            Err(e) => tracing::error!("Cannot encode history of {}: {}", history.room, e),
        }
    }

    fn on_failed(self, failure: ForwardFailure, session_id: String) {
        tracing::debug!("History request for session {} failed: {}", session_id, failure);
    }
}
