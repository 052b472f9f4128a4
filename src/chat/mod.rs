//! Chat Module
//!
//! The chat application built on the cluster primitives.
//!
//! ## Ownership
//! - Rooms live in the `rooms` replicated map; the node that created a room
//!   owns it, and only the owner renames it or keeps its history. Other nodes
//!   forward those requests to the owner.
//! - Users live in the `users` map, each node holding the users of its own
//!   sessions.
//! - Room members live in one replicated list per room, each node holding the
//!   members that joined through it.
//! - Room ids come from the `room_ids` master counter; the number of
//!   connected users from the `user_count` distributed counter.
//!
//! ## Client protocol
//! Clients publish on `/service/*` channels, get replies on the same channel
//! and errors on `/service/status`. Broadcasts go out on `/rooms`, `/users`,
//! `/chat/<id>` and `/members/<id>`.

pub mod auth;
pub mod handlers;
pub mod history;
pub mod members;
pub mod messages;
pub mod node;
pub mod protocol;
pub mod room_create;
pub mod room_edit;
pub mod room_join;
pub mod rooms;
pub mod types;
pub mod user_count;
pub mod users;


pub use node::ChatNode;
pub use types::{ChatHistoryInfo, ChatInfo, Membership, RoomChatInfo, RoomInfo, UserInfo};

use crate::messaging::ClientSession;
use protocol::CHANNEL_STATUS;

/// Reports a failed request to the client that sent it.
pub(crate) fn deliver_status(session: &ClientSession, message: &str) {
    tracing::debug!("Status for session {}: {}", session.id(), message);
    session.deliver(CHANNEL_STATUS, serde_json::Value::from(message));
}
