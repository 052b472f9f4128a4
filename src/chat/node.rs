use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::auth::{AuthError, authenticate};
use super::history::{ChatHistoryArchiveService, ChatHistoryRequestService, ChatHistoryService};
use super::members::RoomMembersService;
use super::messages::ChatService;
use super::protocol::{
    ATTR_USER, CHANNEL_CHAT, CHANNEL_INIT, CHANNEL_ROOM_CREATE, CHANNEL_ROOM_EDIT,
    CHANNEL_ROOM_JOIN, CHANNEL_ROOM_LEAVE,
};
use super::room_create::RoomCreateService;
use super::room_edit::RoomEditService;
use super::room_join::{RoomJoinService, RoomLeaveService};
use super::rooms::RoomsService;
use super::user_count::UserCountService;
use super::users::UsersService;
use crate::cluster::Cluster;
use crate::config::Bootstrap;
use crate::forward::ForwardingService;
use crate::messaging::ClientSession;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("clients cannot publish on {0}")]
    UnknownChannel(String),

    #[error("malformed message on {channel}: {source}")]
    BadRequest {
        channel: String,
        #[source]
        source: serde_json::Error,
    },
}

/// All chat services of one node, wired together.
pub struct ChatNode {
    cluster: Arc<Cluster>,
    user_count: Arc<UserCountService>,
    users: Arc<UsersService>,
    members: Arc<RoomMembersService>,
    rooms: Arc<RoomsService>,
    history: Arc<ChatHistoryService>,
    archive: Arc<ChatHistoryArchiveService>,
    history_request: Arc<ChatHistoryRequestService>,
    join: Arc<RoomJoinService>,
    leave: Arc<RoomLeaveService>,
    edit: Arc<RoomEditService>,
    create: Arc<RoomCreateService>,
    chat: Arc<ChatService>,
}

impl ChatNode {
    /// Starts every service, dependencies first, and hooks them to the
    /// session lifecycle of the local hub.
    pub fn start(
        cluster: Arc<Cluster>,
        bootstrap: &Bootstrap,
        history_size: usize,
    ) -> anyhow::Result<Arc<Self>> {
        let forwarding = ForwardingService::new(cluster.clone());

        let user_count = UserCountService::new(cluster.clone());
        user_count.start();

        let users = UsersService::new(cluster.clone());
        users.start();

        let members = RoomMembersService::new(cluster.clone(), users.clone());

        let rooms = RoomsService::new(cluster.clone(), members.clone());
        rooms.start(&bootstrap.rooms);

        let history = ChatHistoryService::new(history_size);

        let archive =
            ChatHistoryArchiveService::new(forwarding.clone(), rooms.clone(), history.clone());
        archive.start();

        let history_request =
            ChatHistoryRequestService::new(forwarding.clone(), rooms.clone(), history.clone());
        history_request.start();

        let join = RoomJoinService::new(
            rooms.clone(),
            users.clone(),
            members.clone(),
            history_request.clone(),
        );
        let leave = RoomLeaveService::new(rooms.clone(), users.clone(), members.clone());

        let edit = RoomEditService::new(
            forwarding.clone(),
            rooms.clone(),
            users.clone(),
            members.clone(),
        );
        edit.start();

        let (is_master, initial) = match bootstrap.room_ids {
            Some(initial) => (true, initial),
            None => (false, 0),
        };
        let create = RoomCreateService::new(cluster.clone(), rooms.clone(), is_master, initial);
        create.start();

        let chat = ChatService::new(cluster.clone(), users.clone(), rooms.clone(), archive.clone())?;

        let hub = cluster.hub();
        hub.add_listener(user_count.clone());
        hub.add_listener(users.clone());
        hub.add_listener(members.clone());
        hub.add_listener(rooms.clone());

        tracing::info!(
            "Chat node {} started ({} bootstrap room(s), room id master: {})",
            cluster.local_id(),
            bootstrap.rooms.len(),
            is_master
        );

        Ok(Arc::new(Self {
            cluster,
            user_count,
            users,
            members,
            rooms,
            history,
            archive,
            history_request,
            join,
            leave,
            edit,
            create,
            chat,
        }))
    }

    pub fn stop(&self) {
        self.create.stop();
        self.edit.stop();
        self.history_request.stop();
        self.archive.stop();
        self.rooms.stop();
        self.users.stop();
        self.user_count.stop();
        tracing::info!("Chat node {} stopped", self.cluster.local_id());
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn rooms(&self) -> &Arc<RoomsService> {
        &self.rooms
    }

    pub fn members(&self) -> &Arc<RoomMembersService> {
        &self.members
    }

    pub fn users(&self) -> &Arc<UsersService> {
        &self.users
    }

    pub fn user_count(&self) -> &Arc<UserCountService> {
        &self.user_count
    }

    pub fn history(&self) -> &Arc<ChatHistoryService> {
        &self.history
    }

    pub fn room_create(&self) -> &Arc<RoomCreateService> {
        &self.create
    }

    pub fn room_edit(&self) -> &Arc<RoomEditService> {
        &self.edit
    }

    /// Authenticates a client and opens its session.
    pub fn handshake(&self, ext: Option<&Value>) -> Result<Arc<ClientSession>, AuthError> {
        let user = authenticate(ext)?;
        let session = Arc::new(ClientSession::new());
        if let Err(e) = session.set_attribute(ATTR_USER, &user) {
            tracing::error!("Cannot attach {} to session: {}", user, e);
        }
        tracing::info!("Handshake from {} -> session {}", user, session.id());
        self.cluster.hub().open_session(session.clone());
        Ok(session)
    }

    pub fn disconnect(&self, session_id: &str) -> bool {
        self.cluster.hub().close_session(session_id, false)
    }

    /// Routes a message a client published on a service channel.
    pub fn publish(
        &self,
        session: &Arc<ClientSession>,
        channel: &str,
        data: Value,
    ) -> Result<(), PublishError> {
        match channel {
            CHANNEL_INIT => self.user_count.init(session),
            CHANNEL_ROOM_CREATE => self.create.create(session, decode(channel, data)?),
            CHANNEL_ROOM_EDIT => self.edit.edit(session, decode(channel, data)?),
            CHANNEL_ROOM_JOIN => self.join.join(session, decode(channel, data)?),
            CHANNEL_ROOM_LEAVE => self.leave.leave(session, decode(channel, data)?),
            CHANNEL_CHAT => self.chat.chat(session, decode(channel, data)?),
            other => return Err(PublishError::UnknownChannel(other.to_string())),
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(channel: &str, data: Value) -> Result<T, PublishError> {
    serde_json::from_value(data).map_err(|source| PublishError::BadRequest {
        channel: channel.to_string(),
        source,
    })
}
