use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

pub type Result<T> = std::result::Result<T, StoreError>;

/// The injected room store, shared by every component of the collab system.
pub type SharedStore = Arc<dyn RoomStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened with the store
    #[error("Internal store error: {0}")]
    Internal(String),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the store doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
}

/// Represents a type that can persist pointable rooms and their members.
///
/// Every read returns a fully materialized room, consistent at the point of
/// the call. Implementations must make [`RoomStore::add_member`] an atomic
/// compare-and-insert on the member name: of two concurrent joins with the
/// same name, exactly one gets the conflict error.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Creates a room, assigning its id and admin token
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn room_by_id(&self, room_id: &str) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    /// Returns the ids of all rooms created more than `max_age` ago
    async fn list_expired(&self, max_age: Duration) -> Result<Vec<RoomId>>;
    /// Deletes a room and all of its members. Deleting a room that is
    /// already gone is a no-op.
    async fn delete_room(&self, room_id: &str) -> Result<()>;

    async fn add_member(&self, room_id: &str, new_member: NewMember) -> Result<MemberData>;
    async fn member_by_session(&self, room_id: &str, session_id: &str) -> Result<MemberData>;
    async fn member_by_name(&self, room_id: &str, name: &str) -> Result<MemberData>;
    async fn member_by_connection(&self, room_id: &str, connection_id: &str)
        -> Result<MemberData>;

    async fn set_vote(
        &self,
        room_id: &str,
        member_id: PrimaryKey,
        point: Option<CardValue>,
    ) -> Result<MemberData>;
    /// Clears every member's vote and the room's revealed flag
    async fn reset_votes(&self, room_id: &str) -> Result<()>;
    async fn set_revealed(&self, room_id: &str, revealed: bool) -> Result<RoomData>;

    /// Associates or clears a member's live connection, updating the
    /// connected flag accordingly
    async fn update_connection(
        &self,
        room_id: &str,
        member_id: PrimaryKey,
        connection_id: Option<String>,
    ) -> Result<MemberData>;
    /// Replaces a member's durable session identifier, used when a client
    /// rejoins by name from a different device
    async fn update_session(
        &self,
        room_id: &str,
        member_id: PrimaryKey,
        session_id: &str,
    ) -> Result<MemberData>;
    async fn count_connected(&self, room_id: &str) -> Result<usize>;
}
