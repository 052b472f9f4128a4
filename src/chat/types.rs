use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access tier shared by users and rooms, ordered `Bronze < Silver < Gold`.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Membership {
    #[default]
    Bronze,
    Silver,
    Gold,
}

impl Membership {
    /// A room of tier `self` admits a user of tier `user`.
    pub fn implies(self, user: Membership) -> bool {
        user >= self
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Membership::Bronze => "BRONZE",
            Membership::Silver => "SILVER",
            Membership::Gold => "GOLD",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown membership tier '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for Membership {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BRONZE" => Ok(Membership::Bronze),
            "SILVER" => Ok(Membership::Silver),
            "GOLD" => Ok(Membership::Gold),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// A chat room. Never mutated: an edit replaces it with a new value under the
/// same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: i64,
    pub name: String,
    pub membership: Membership,
}

impl RoomInfo {
    pub fn new(id: i64, name: impl Into<String>, membership: Membership) -> Self {
        Self {
            id,
            name: name.into(),
            membership,
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(self.id, name, self.membership)
    }
}

impl fmt::Display for RoomInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomInfo[{}/{}]", self.id, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserInfo {
    pub id: String,
    pub membership: Membership,
}

impl UserInfo {
    pub fn new(id: impl Into<String>, membership: Membership) -> Self {
        Self {
            id: id.into(),
            membership,
        }
    }
}

impl fmt::Display for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserInfo[{}/{}]", self.id, self.membership)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatInfo {
    pub user: UserInfo,
    pub text: String,
}

/// A chat message addressed to the history of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomChatInfo {
    pub room: RoomInfo,
    pub chat: ChatInfo,
}

/// The retained history of one room, oldest message first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryInfo {
    pub room: RoomInfo,
    pub max_entries: usize,
    pub chats: Vec<ChatInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_rule() {
        assert!(Membership::Bronze.implies(Membership::Gold));
        assert!(Membership::Bronze.implies(Membership::Bronze));
        assert!(Membership::Silver.implies(Membership::Gold));
        assert!(!Membership::Gold.implies(Membership::Bronze));
        assert!(!Membership::Gold.implies(Membership::Silver));
    }

    #[test]
    fn test_membership_defaults_to_bronze() {
        assert_eq!(Membership::default(), Membership::Bronze);
    }

    #[test]
    fn test_tier_parsing_is_case_insensitive() {
        assert_eq!("gold".parse::<Membership>(), Ok(Membership::Gold));
        assert_eq!("Silver".parse::<Membership>(), Ok(Membership::Silver));
        assert!("platinum".parse::<Membership>().is_err());
    }

    #[test]
    fn test_room_wire_shape() {
        let room = RoomInfo::new(7, "Lobby", Membership::Bronze);
        assert_eq!(
            serde_json::to_value(&room).unwrap(),
            serde_json::json!({"id": 7, "name": "Lobby", "membership": "BRONZE"})
        );
    }

    #[test]
    fn test_history_wire_shape_uses_camel_case() {
        let history = ChatHistoryInfo {
            room: RoomInfo::new(1, "r", Membership::Gold),
            max_entries: 5,
            chats: vec![],
        };
        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(value["maxEntries"], 5);
    }
}
