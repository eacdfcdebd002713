use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use crossbeam::atomic::AtomicCell;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::util::random_string;

use super::{
    CardValue, MemberData, NewMember, NewRoom, PrimaryKey, Result, RoomData, RoomId, RoomStore,
    StoreError,
};

/// An in-process [RoomStore] backed by a concurrent map.
///
/// All mutations of a single room happen while holding its map entry, which
/// is what makes name uniqueness a true per-room compare-and-insert.
pub struct MemoryStore {
    rooms: DashMap<RoomId, RoomData>,
    member_ids: AtomicCell<PrimaryKey>,
}

impl MemoryStore {
    const ROOM_ID_LENGTH: usize = 12;
    const ADMIN_TOKEN_LENGTH: usize = 32;

    pub fn new() -> Self {
        Self {
            rooms: Default::default(),
            member_ids: AtomicCell::new(1),
        }
    }

    fn next_member_id(&self) -> PrimaryKey {
        self.member_ids.fetch_add(1)
    }

    fn not_found(resource: &'static str, identifier: &str) -> StoreError {
        StoreError::NotFound {
            resource,
            identifier: identifier.to_string(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let room = RoomData {
            id: random_string(Self::ROOM_ID_LENGTH),
            admin_token: random_string(Self::ADMIN_TOKEN_LENGTH),
            task_title: new_room.task_title,
            task_description: new_room.task_description,
            admin_name: new_room.admin_name,
            revealed: false,
            created_at: Utc::now(),
            members: Vec::new(),
        };

        // Collisions are practically impossible at this id length, but the
        // entry API keeps the insert honest either way
        match self.rooms.entry(room.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                resource: "room",
                field: "id",
                value: room.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(room.clone());
                Ok(room)
            }
        }
    }

    async fn room_by_id(&self, room_id: &str) -> Result<RoomData> {
        self.rooms
            .get(room_id)
            .map(|room| room.clone())
            .ok_or_else(|| Self::not_found("room", room_id))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self.rooms.iter().map(|room| room.clone()).collect())
    }

    async fn list_expired(&self, max_age: Duration) -> Result<Vec<RoomId>> {
        let now = Utc::now();

        let expired = self
            .rooms
            .iter()
            .filter(|room| {
                (now - room.created_at)
                    .to_std()
                    .map(|age| age > max_age)
                    .unwrap_or(false)
            })
            .map(|room| room.id.clone())
            .collect();

        Ok(expired)
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.rooms.remove(room_id);
        Ok(())
    }

    async fn add_member(&self, room_id: &str, new_member: NewMember) -> Result<MemberData> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::not_found("room", room_id))?;

        if room.members.iter().any(|m| m.name == new_member.name) {
            return Err(StoreError::Conflict {
                resource: "member",
                field: "name",
                value: new_member.name,
            });
        }

        let member = MemberData {
            id: self.next_member_id(),
            session_id: new_member.session_id,
            connected: new_member.connection_id.is_some(),
            connection_id: new_member.connection_id,
            name: new_member.name,
            point: None,
            joined_at: Utc::now(),
        };

        room.members.push(member.clone());
        Ok(member)
    }

    async fn member_by_session(&self, room_id: &str, session_id: &str) -> Result<MemberData> {
        let room = self.room_by_id(room_id).await?;

        room.members
            .iter()
            .find(|m| m.session_id == session_id)
            .cloned()
            .ok_or_else(|| Self::not_found("member", session_id))
    }

    async fn member_by_name(&self, room_id: &str, name: &str) -> Result<MemberData> {
        let room = self.room_by_id(room_id).await?;

        room.members
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .ok_or_else(|| Self::not_found("member", name))
    }

    async fn member_by_connection(&self, room_id: &str, connection_id: &str) -> Result<MemberData> {
        let room = self.room_by_id(room_id).await?;

        room.members
            .iter()
            .find(|m| m.connection_id.as_deref() == Some(connection_id))
            .cloned()
            .ok_or_else(|| Self::not_found("member", connection_id))
    }

    async fn set_vote(
        &self,
        room_id: &str,
        member_id: PrimaryKey,
        point: Option<CardValue>,
    ) -> Result<MemberData> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::not_found("room", room_id))?;

        let member = room
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| Self::not_found("member", &member_id.to_string()))?;

        member.point = point;
        Ok(member.clone())
    }

    async fn reset_votes(&self, room_id: &str) -> Result<()> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::not_found("room", room_id))?;

        room.revealed = false;

        for member in room.members.iter_mut() {
            member.point = None;
        }

        Ok(())
    }

    async fn set_revealed(&self, room_id: &str, revealed: bool) -> Result<RoomData> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::not_found("room", room_id))?;

        room.revealed = revealed;
        Ok(room.clone())
    }

    async fn update_connection(
        &self,
        room_id: &str,
        member_id: PrimaryKey,
        connection_id: Option<String>,
    ) -> Result<MemberData> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::not_found("room", room_id))?;

        let member = room
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| Self::not_found("member", &member_id.to_string()))?;

        member.connected = connection_id.is_some();
        member.connection_id = connection_id;
        Ok(member.clone())
    }

    async fn update_session(
        &self,
        room_id: &str,
        member_id: PrimaryKey,
        session_id: &str,
    ) -> Result<MemberData> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::not_found("room", room_id))?;

        let member = room
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| Self::not_found("member", &member_id.to_string()))?;

        member.session_id = session_id.to_string();
        Ok(member.clone())
    }

    async fn count_connected(&self, room_id: &str) -> Result<usize> {
        let room = self.room_by_id(room_id).await?;

        Ok(room.members.iter().filter(|m| m.connected).count())
    }
}
