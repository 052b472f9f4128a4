//! Client Protocol
//!
//! Channel names and the payloads clients publish on service channels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::UserInfo;

// --- Service channels (client -> node) ---

pub const CHANNEL_INIT: &str = "/service/init";
pub const CHANNEL_ROOM_CREATE: &str = "/service/room/create";
pub const CHANNEL_ROOM_EDIT: &str = "/service/room/edit";
pub const CHANNEL_ROOM_JOIN: &str = "/service/room/join";
pub const CHANNEL_ROOM_LEAVE: &str = "/service/room/leave";
pub const CHANNEL_CHAT: &str = "/service/chat";
/// Errors reported to the requesting client.
pub const CHANNEL_STATUS: &str = "/service/status";

// --- Broadcast channels ---

pub const CHANNEL_ROOMS: &str = "/rooms";
pub const CHANNEL_USERS: &str = "/users";

pub fn chat_channel(room_id: i64) -> String {
    format!("/chat/{}", room_id)
}

pub fn members_channel(room_id: i64) -> String {
    format!("/members/{}", room_id)
}

// --- Session attributes ---

pub const ATTR_USER: &str = "user";
pub const ATTR_COUNTED: &str = "counted";

// --- Service channel payloads ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRoomRequest {
    pub room_id: i64,
    pub room_name: Option<String>,
}

/// Forwarded to the owner of the room being edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEditAction {
    pub user_id: String,
    pub room_id: i64,
    pub room_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub room_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub room_id: i64,
    pub text: String,
}

/// Payload of `/members/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembersUpdate {
    pub action: MemberAction,
    pub members: Vec<UserInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberAction {
    Join,
    Leave,
}

// --- HTTP bodies ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    #[serde(default)]
    pub ext: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}
