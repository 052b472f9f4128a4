use regex::Regex;
use std::sync::Arc;

use super::deliver_status;
use super::history::ChatHistoryArchiveService;
use super::protocol::{ChatRequest, chat_channel};
use super::rooms::RoomsService;
use super::types::{ChatInfo, RoomChatInfo};
use super::users::UsersService;
use crate::cluster::Cluster;
use crate::messaging::ClientSession;

/// Replaces words clients are not allowed to send.
pub struct BadWordFilter {
    pattern: Regex,
}

impl BadWordFilter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"\b(dang)\b")?,
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, "dong").into_owned()
    }
}

/// Handles `/service/chat`: filters the text, publishes it on the room's
/// chat channel of every node and archives it at the room owner.
pub struct ChatService {
    cluster: Arc<Cluster>,
    users: Arc<UsersService>,
    rooms: Arc<RoomsService>,
    archive: Arc<ChatHistoryArchiveService>,
    filter: BadWordFilter,
}

impl ChatService {
    pub fn new(
        cluster: Arc<Cluster>,
        users: Arc<UsersService>,
        rooms: Arc<RoomsService>,
        archive: Arc<ChatHistoryArchiveService>,
    ) -> Result<Arc<Self>, regex::Error> {
        Ok(Arc::new(Self {
            cluster,
            users,
            rooms,
            archive,
            filter: BadWordFilter::new()?,
        }))
    }

    pub fn chat(&self, session: &Arc<ClientSession>, request: ChatRequest) {
        let Some(user) = self.users.user_of(session) else {
            deliver_status(session, "Cannot chat, unknown user");
            return;
        };
        let Some(room) = self.rooms.find_room(request.room_id) else {
            deliver_status(session, "Cannot chat, unknown room");
            return;
        };

        let chat = ChatInfo {
            user,
            text: self.filter.apply(&request.text),
        };
        match serde_json::to_value(&chat) {
            Ok(data) => self.cluster.publish(&chat_channel(room.id), data),
            Err(e) => {
                tracing::error!("Cannot encode chat for {}: {}", room, e);
                return;
            }
        }

        self.archive.archive(RoomChatInfo { room, chat });
    }
}
