use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used for member primary keys. Ids are monotonic and never
/// reused after a member is removed.
pub type PrimaryKey = u32;

/// The opaque identifier of a room.
pub type RoomId = String;

/// A single estimation card selection.
///
/// Cards are usually numeric, but decks also carry labels such as "?" or
/// "coffee", which never participate in the average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardValue {
    Number(f64),
    Label(String),
}

impl CardValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Label(_) => None,
        }
    }
}

/// A planning poker room
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: RoomId,
    pub task_title: String,
    pub task_description: String,
    /// Display name of the creator
    pub admin_name: String,
    /// The capability secret authorizing reveal, reset, and end.
    /// Never exposed through any sanitized view.
    pub admin_token: String,
    /// Whether vote values are currently visible to everyone
    pub revealed: bool,
    pub created_at: DateTime<Utc>,
    /// Members in join order, oldest first. Names are unique within a room.
    pub members: Vec<MemberData>,
}

impl RoomData {
    pub fn member(&self, member_id: PrimaryKey) -> Option<&MemberData> {
        self.members.iter().find(|m| m.id == member_id)
    }
}

/// A participant's durable identity within one room
#[derive(Debug, Clone)]
pub struct MemberData {
    pub id: PrimaryKey,
    /// The opaque per-client token used to re-associate new connections
    /// with this member across reconnects. Only ever compared for equality.
    pub session_id: String,
    /// The current live transport connection, if any
    pub connection_id: Option<String>,
    /// Display name, unique within the room, immutable after joining
    pub name: String,
    /// The member's current vote. Cleared on every reset.
    pub point: Option<CardValue>,
    pub connected: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub task_title: String,
    pub task_description: String,
    pub admin_name: String,
}

#[derive(Debug)]
pub struct NewMember {
    pub name: String,
    pub session_id: String,
    pub connection_id: Option<String>,
}
